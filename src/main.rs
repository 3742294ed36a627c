use std::fs;
use std::sync::Arc;

use teloxide::prelude::*;

mod api;
mod config;
mod processing;
mod quota;
mod selector;
mod webhook;

use crate::config::Config;
use crate::processing::AppContext;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {:#}", e);
            return;
        }
    };
    if let Err(e) = fs::create_dir_all(&config.temp_video_path) {
        log::error!("Error: couldn't create videos directory.\n{}", e);
        return;
    }
    let bot = Bot::new(config.bot_token.clone());
    let ctx = Arc::new(AppContext::new(config));
    tokio::spawn(webhook::run(ctx.clone()));
    processing::bot::run(bot, ctx).await;
}
