use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, KeyboardButton, KeyboardMarkup};
use teloxide::utils::command::BotCommands;

use crate::api::drive;
use crate::processing::{claim_next, AppContext, Claim};
use crate::quota::UserId;

const GET_VIDEO_BUTTON: &str = "Get Video 🍒";
const VIEW_PLAN_BUTTON: &str = "View Plan 💵";

const TRY_AGAIN_LATER: &str = "Something went wrong. Please try again later.";
const STORAGE_UNAVAILABLE_TEXT: &str =
    "No videos are available right now. Please try again later.";
const CATALOG_EMPTY_TEXT: &str = "No videos found in the storage folder.";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "show the menu.")]
    Start,
    #[command(description = "buy premium for ₹99.")]
    Buy,
}

pub(crate) async fn run(bot: Bot, ctx: Arc<AppContext>) {
    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    command: Command,
    ctx: Arc<AppContext>,
) -> Result<(), anyhow::Error> {
    match command {
        Command::Start => {
            let keyboard = KeyboardMarkup::new([[
                KeyboardButton::new(VIEW_PLAN_BUTTON),
                KeyboardButton::new(GET_VIDEO_BUTTON),
            ]])
            .resize_keyboard(true);
            bot.send_message(msg.chat.id, "Welcome! Choose an option below:")
                .reply_markup(keyboard)
                .await?;
        }
        Command::Buy => send_payment_link(&bot, &msg, &ctx).await?,
    }
    Ok(())
}

async fn handle_text(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<(), anyhow::Error> {
    match msg.text() {
        Some(GET_VIDEO_BUTTON) => {
            let status = send_video(&bot, &msg, &ctx).await;
            if let Err(e) = &status {
                log::error!("Video delivery failed: {:#}", e);
                if bot.send_message(msg.chat.id, TRY_AGAIN_LATER).await.is_err() {
                    log::error!("Failed to respond to user with error message");
                }
            }
            status?;
        }
        Some(VIEW_PLAN_BUTTON) => {
            bot.send_message(msg.chat.id, "Buy premium for ₹99 using /buy command.")
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please use the provided buttons.")
                .await?;
        }
    }
    Ok(())
}

async fn send_payment_link(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
) -> Result<(), anyhow::Error> {
    match ctx.payments.create_invoice(msg.chat.id.0, Utc::now()).await {
        Ok(url) => {
            bot.send_message(
                msg.chat.id,
                format!("Buy premium for ₹99 using this link: {}", url),
            )
            .await?;
        }
        Err(e) => {
            log::error!("Invoice creation failed: {:#}", e);
            bot.send_message(
                msg.chat.id,
                "Failed to generate payment link. Please try again later.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn send_video(bot: &Bot, msg: &Message, ctx: &AppContext) -> Result<(), anyhow::Error> {
    let user: UserId = msg
        .from()
        .map(|u| u.id.0 as UserId)
        .unwrap_or(msg.chat.id.0);

    let catalog = match ctx.storage.list_videos().await {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("Video listing failed: {:#}", e);
            bot.send_message(msg.chat.id, STORAGE_UNAVAILABLE_TEXT).await?;
            return Ok(());
        }
    };

    let (video, remaining) = match claim_next(&ctx.store, user, &catalog, Utc::now()).await {
        Claim::Reserved { video, remaining } => (video, remaining),
        Claim::LimitReached { hours_left } => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "Daily limit reached! Wait {} hours for more videos or purchase premium using /buy command.",
                    hours_left
                ),
            )
            .await?;
            return Ok(());
        }
        Claim::CatalogEmpty => {
            bot.send_message(msg.chat.id, CATALOG_EMPTY_TEXT).await?;
            return Ok(());
        }
        Claim::CatalogExhausted => {
            bot.send_message(
                msg.chat.id,
                "All videos have been sent. Please try again tomorrow or purchase premium using /buy command.",
            )
            .await?;
            return Ok(());
        }
    };

    log::info!(
        "Sending video {} ({}) to chat {}, {} left today",
        video.name,
        video.id,
        msg.chat.id,
        remaining
    );
    let path = match ctx.storage.download(&video.id).await {
        Ok(path) => path,
        Err(e) => {
            log::error!("Download of {} failed: {:#}", video.id, e);
            ctx.store.rollback(user, &video.id).await;
            bot.send_message(
                msg.chat.id,
                "Failed to download the video. Please try again later.",
            )
            .await?;
            return Ok(());
        }
    };

    let sent = bot
        .send_video(msg.chat.id, InputFile::file(path.clone()))
        .await;
    drive::remove_temp_file(&path).await;
    if let Err(e) = sent {
        log::error!("Sending video {} failed: {}", video.id, e);
        ctx.store.rollback(user, &video.id).await;
        bot.send_message(
            msg.chat.id,
            "Failed to send the video. Please try again later.",
        )
        .await?;
    }
    Ok(())
}
