use super::*;
use crate::frame::ErrorCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Duration, timeout};

// =============================================================================
// AtomicUpdate
// =============================================================================

#[test]
fn praying_update_is_increment_by_one() {
    let uid = Uuid::new_v4();
    let update = AtomicUpdate::praying(uid);
    assert_eq!(update.increment, 1);
    assert_eq!(update.add_to_set, uid);
}

// =============================================================================
// LedgerError
// =============================================================================

#[test]
fn error_codes() {
    let id = Uuid::nil();
    assert_eq!(LedgerError::NotFound(id).error_code(), "E_REQUEST_NOT_FOUND");
    assert_eq!(LedgerError::AlreadyApplied { id, uid: id }.error_code(), "E_ALREADY_APPLIED");
    assert_eq!(LedgerError::PermissionDenied.error_code(), "E_PERMISSION_DENIED");
    assert_eq!(LedgerError::Closed.error_code(), "E_SUBSCRIPTION_CLOSED");
}

#[test]
fn only_transient_errors_are_retryable() {
    assert!(LedgerError::Unavailable("down".into()).retryable());
    assert!(!LedgerError::PermissionDenied.retryable());
    assert!(!LedgerError::NotFound(Uuid::nil()).retryable());
}

#[test]
fn classify_passes_through_non_database_errors() {
    assert!(matches!(classify(sqlx::Error::RowNotFound), LedgerError::Database(_)));
}

// =============================================================================
// Subscription
// =============================================================================

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn subscription_yields_then_ends() {
    let (tx, rx) = mpsc::channel(4);
    let mut sub = Subscription::new(rx, None);
    tx.send(Ok(Vec::new())).await.expect("send");
    drop(tx);

    assert!(matches!(sub.next().await, Some(Ok(list)) if list.is_empty()));
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn dropping_subscription_aborts_feed() {
    let (_tx, rx) = mpsc::channel::<Result<Snapshot, LedgerError>>(1);
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(Arc::clone(&dropped));
    let feed = tokio::spawn(async move {
        let _flag = flag;
        std::future::pending::<()>().await;
    });
    tokio::task::yield_now().await;

    drop(Subscription::new(rx, Some(feed)));
    timeout(Duration::from_millis(500), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("feed task should be aborted");
}

#[tokio::test]
async fn memory_feed_survives_lagged_broadcast() {
    use crate::state::test_helpers::MemoryLedger;

    let ledger = MemoryLedger::new();
    let mut sub = ledger.subscribe().await.expect("subscribe");
    // More changes than the broadcast buffer holds, with no yield in between.
    for i in 0..100 {
        ledger
            .create(NewPrayerRequest {
                title: format!("r{i}"),
                body: "Please pray.".into(),
                author_label: String::new(),
                owner_id: Uuid::new_v4(),
            })
            .await
            .expect("create");
    }

    let first = timeout(Duration::from_millis(500), sub.next()).await.expect("first");
    assert!(matches!(first, Some(Ok(_))));
    let next = timeout(Duration::from_millis(500), sub.next()).await.expect("after lag");
    assert!(matches!(next, Some(Ok(list)) if list.len() == 100));
}

// =============================================================================
// PgLedger (requires DATABASE_URL)
// =============================================================================

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn ledger() -> (PgLedger, Uuid) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live tests");
        let pool = PgPoolOptions::new().connect(&url).await.expect("connect");
        sqlx::migrate!("src/db/migrations").run(&pool).await.expect("migrate");
        let owner: Uuid = sqlx::query("INSERT INTO users (email, name) VALUES ($1, 'Owner') RETURNING id")
            .bind(format!("{}@example.org", Uuid::new_v4()))
            .fetch_one(&pool)
            .await
            .expect("user")
            .get("id");
        (PgLedger::new(pool), owner)
    }

    fn new_request(owner_id: Uuid, title: &str) -> NewPrayerRequest {
        NewPrayerRequest {
            title: title.to_owned(),
            body: "Please pray.".into(),
            author_label: String::new(),
            owner_id,
        }
    }

    #[tokio::test]
    async fn praying_twice_counts_once() {
        let (ledger, owner) = ledger().await;
        let id = ledger.create(new_request(owner, "Job")).await.expect("create");
        let uid = Uuid::new_v4();

        ledger.update_atomic(id, AtomicUpdate::praying(uid)).await.expect("first");
        let err = ledger
            .update_atomic(id, AtomicUpdate::praying(uid))
            .await
            .expect_err("second");
        assert!(matches!(err, LedgerError::AlreadyApplied { .. }));

        let list = list_requests(&ledger.pool).await.expect("list");
        let stored = list.iter().find(|r| r.id == id).expect("stored");
        assert_eq!(stored.prayer_count, 1);
        assert_eq!(stored.prayed_by.len(), 1);
    }

    async fn insert_at(ledger: &PgLedger, owner: Uuid, title: &str, created_ms: i64) -> Uuid {
        sqlx::query(
            r"INSERT INTO prayer_requests (title, body, owner_id, created_at)
              VALUES ($1, 'Please pray.', $2, to_timestamp($3::double precision / 1000))
              RETURNING id",
        )
        .bind(title)
        .bind(owner)
        .bind(created_ms)
        .fetch_one(&ledger.pool)
        .await
        .expect("insert")
        .get("id")
    }

    #[tokio::test]
    async fn snapshot_is_newest_first_with_insertion_tiebreak() {
        let (ledger, owner) = ledger().await;
        // Dated in 2000 so concurrent tests' rows sort above these.
        let first_tied = insert_at(&ledger, owner, "Tied first", 946_684_800_123).await;
        let second_tied = insert_at(&ledger, owner, "Tied second", 946_684_800_123).await;
        let newer = insert_at(&ledger, owner, "Newer", 946_771_200_456).await;

        let ours = [first_tied, second_tied, newer];
        let list: Vec<_> = list_requests(&ledger.pool)
            .await
            .expect("list")
            .into_iter()
            .filter(|r| ours.contains(&r.id))
            .collect();

        let ids: Vec<_> = list.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer, first_tied, second_tied]);
        assert_eq!(list[0].created_at, Some(946_771_200_456));
        assert_eq!(list[1].created_at, Some(946_684_800_123));

        for id in ours {
            ledger.delete_by_id(id).await.expect("cleanup");
        }
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let (ledger, _) = ledger().await;
        let err = ledger.delete_by_id(Uuid::new_v4()).await.expect_err("missing");
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn subscription_sees_new_request() {
        let (ledger, owner) = ledger().await;
        let mut sub = ledger.subscribe().await.expect("subscribe");
        timeout(Duration::from_secs(2), sub.next()).await.expect("first").expect("open").expect("ok");

        let id = ledger.create(new_request(owner, "Travel")).await.expect("create");
        let next = timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("change")
            .expect("open")
            .expect("ok");
        assert_eq!(next.first().map(|r| r.id), Some(id));
    }
}
