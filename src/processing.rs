pub(crate) mod bot;

use chrono::{DateTime, Utc};

use crate::api::drive::DriveApi;
use crate::api::payments::PaymentsApi;
use crate::api::{VideoFile, VideoStorage};
use crate::config::Config;
use crate::quota::{Admission, QuotaStore, UserId};
use crate::selector::{self, Selection};

/// Shared by the Telegram dispatcher and the payment webhook; both mutate
/// the same quota store.
pub(crate) struct AppContext {
    pub(crate) config: Config,
    pub(crate) store: QuotaStore,
    pub(crate) storage: Box<dyn VideoStorage + Send + Sync>,
    pub(crate) payments: PaymentsApi,
}

impl AppContext {
    pub(crate) fn new(config: Config) -> Self {
        let storage = DriveApi::new(&config.drive_credentials, &config.temp_video_path);
        let payments = PaymentsApi::new(
            config.payments_api_key.clone(),
            config.webhook_url.clone(),
        );
        Self {
            store: QuotaStore::new(config.daily_limit),
            storage: Box::new(storage),
            payments,
            config,
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Claim {
    /// A video was picked and counted against the quota. The caller owns
    /// the delivery and must roll back if it fails.
    Reserved { video: VideoFile, remaining: u32 },
    LimitReached { hours_left: i64 },
    CatalogEmpty,
    CatalogExhausted,
}

/// Admission, selection and reservation for one user as a single critical
/// section. The catalog is fetched by the caller beforehand so no network
/// call happens while the user's lock is held.
pub(crate) async fn claim_next(
    store: &QuotaStore,
    user: UserId,
    catalog: &[VideoFile],
    now: DateTime<Utc>,
) -> Claim {
    let mut session = store.begin(user).await;
    let remaining = match session.admit(now) {
        Admission::Denied { retry_after } => {
            return Claim::LimitReached {
                hours_left: retry_after.num_hours(),
            };
        }
        Admission::Granted { remaining } => remaining,
    };
    match selector::select(catalog, session.delivered()) {
        Selection::Empty => Claim::CatalogEmpty,
        Selection::Exhausted => Claim::CatalogExhausted,
        Selection::Selected(video) => {
            session.reserve(&video.id);
            Claim::Reserved {
                video: video.clone(),
                remaining,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn catalog(ids: &[&str]) -> Vec<VideoFile> {
        ids.iter()
            .map(|id| VideoFile {
                id: id.to_string(),
                name: format!("{}.mp4", id),
            })
            .collect()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn fourth_request_is_denied_with_a_positive_wait() {
        let store = QuotaStore::new(3);
        let catalog = catalog(&["a", "b", "c", "d", "e"]);
        let mut delivered_ids = HashSet::new();
        for i in 0..3 {
            let now = t0() + Duration::minutes(i);
            match claim_next(&store, 1, &catalog, now).await {
                Claim::Reserved { video, remaining } => {
                    assert_eq!(remaining, 2 - i as u32);
                    assert!(delivered_ids.insert(video.id));
                }
                other => panic!("request {} unexpectedly failed: {:?}", i + 1, other),
            }
        }
        assert_eq!(delivered_ids.len(), 3);
        match claim_next(&store, 1, &catalog, t0() + Duration::minutes(3)).await {
            Claim::LimitReached { hours_left } => assert_eq!(hours_left, 23),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn small_catalog_exhausts_before_the_quota_does() {
        let store = QuotaStore::new(3);
        let catalog = catalog(&["a", "b"]);
        for _ in 0..2 {
            assert!(matches!(
                claim_next(&store, 1, &catalog, t0()).await,
                Claim::Reserved { .. }
            ));
        }
        assert_eq!(
            claim_next(&store, 1, &catalog, t0()).await,
            Claim::CatalogExhausted
        );
    }

    #[tokio::test]
    async fn empty_catalog_is_reported_as_such() {
        let store = QuotaStore::new(3);
        assert_eq!(claim_next(&store, 1, &[], t0()).await, Claim::CatalogEmpty);
    }

    #[tokio::test]
    async fn exhausted_catalog_opens_up_again_after_reset() {
        let store = QuotaStore::new(3);
        let catalog = catalog(&["a"]);
        assert!(matches!(
            claim_next(&store, 1, &catalog, t0()).await,
            Claim::Reserved { .. }
        ));
        assert_eq!(
            claim_next(&store, 1, &catalog, t0()).await,
            Claim::CatalogExhausted
        );
        let next_day = t0() + Duration::hours(24);
        assert!(matches!(
            claim_next(&store, 1, &catalog, next_day).await,
            Claim::Reserved { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_requests_cannot_overdraw_the_quota() {
        let store = QuotaStore::new(1);
        let catalog = catalog(&["a", "b", "c"]);
        let (first, second) = tokio::join!(
            claim_next(&store, 1, &catalog, t0()),
            claim_next(&store, 1, &catalog, t0()),
        );
        let granted = [&first, &second]
            .iter()
            .filter(|claim| matches!(claim, Claim::Reserved { .. }))
            .count();
        assert_eq!(granted, 1, "exactly one of {:?} / {:?}", first, second);
    }

    #[tokio::test]
    async fn users_do_not_share_quota_or_delivered_sets() {
        let store = QuotaStore::new(1);
        let catalog = catalog(&["a"]);
        assert!(matches!(
            claim_next(&store, 1, &catalog, t0()).await,
            Claim::Reserved { .. }
        ));
        assert!(matches!(
            claim_next(&store, 2, &catalog, t0()).await,
            Claim::Reserved { .. }
        ));
    }
}
