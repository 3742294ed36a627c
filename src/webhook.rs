use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::payments::user_id_from_order_id;
use crate::processing::AppContext;
use crate::quota::{QuotaStore, UserId};

const IPN_SECRET_HEADER: &str = "x-ipn-secret";

/// Payment provider notification; any fields beyond these two are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct PaymentNotification {
    payment_status: String,
    order_id: String,
}

#[derive(Debug, PartialEq)]
pub(crate) enum NotificationOutcome {
    Activated {
        user: UserId,
        expires_at: DateTime<Utc>,
    },
    /// Not a final payment status; acknowledged and dropped.
    Ignored,
    BadOrderId,
}

pub(crate) fn process_notification(
    store: &QuotaStore,
    notification: &PaymentNotification,
    now: DateTime<Utc>,
) -> NotificationOutcome {
    if notification.payment_status != "finished" {
        return NotificationOutcome::Ignored;
    }
    match user_id_from_order_id(&notification.order_id) {
        Some(user) => {
            let expires_at = store.activate_subscription(user, now);
            NotificationOutcome::Activated { user, expires_at }
        }
        None => NotificationOutcome::BadOrderId,
    }
}

pub(crate) async fn run(ctx: Arc<AppContext>) {
    if ctx.config.ipn_secret.is_none() {
        log::warn!("PAYMENT_IPN_SECRET is not set, accepting unauthenticated payment notifications");
    }
    let addr = format!("0.0.0.0:{}", ctx.config.port);
    let app = router(ctx);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind payment webhook on {}: {}", addr, e);
            return;
        }
    };
    log::info!("Payment webhook listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Payment webhook stopped: {}", e);
    }
}

fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/webhook", post(handle_notification))
        .with_state(ctx)
}

async fn handle_notification(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(notification): Json<PaymentNotification>,
) -> (StatusCode, &'static str) {
    if let Some(secret) = &ctx.config.ipn_secret {
        let provided = headers.get(IPN_SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(secret.as_str()) {
            log::warn!("Rejected payment notification with missing or wrong IPN secret");
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }
    match process_notification(&ctx.store, &notification, Utc::now()) {
        NotificationOutcome::Activated { user, expires_at } => {
            log::info!("Payment finished for user {}, premium until {}", user, expires_at);
            (StatusCode::OK, "OK")
        }
        NotificationOutcome::Ignored => (StatusCode::OK, "OK"),
        NotificationOutcome::BadOrderId => {
            log::warn!(
                "Payment notification with unparsable order id {:?}",
                notification.order_id
            );
            (StatusCode::BAD_REQUEST, "bad order id")
        }
    }
}
