//! Ledger: the persisted, subscribable collection of prayer requests.
//!
//! ARCHITECTURE
//! ============
//! The wall only sees the `Ledger` trait. `PgLedger` stores requests in
//! Postgres and fans change notifications out over a broadcast channel; each
//! subscription runs a feed task that re-queries the full list after every
//! change and forwards it as one snapshot.
//!
//! DESIGN
//! ======
//! - Snapshots are total, never deltas. Consumers re-render from scratch.
//! - The praying mark is a single guarded `UPDATE` that bumps the counter and
//!   appends to `prayed_by` together; a CHECK constraint keeps
//!   `prayer_count = cardinality(prayed_by)`.
//! - Dropping a `Subscription` aborts its feed task, so teardown happens
//!   exactly once, wherever the handle goes.

use std::collections::BTreeSet;

use sqlx::{PgPool, Row};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wall::model::{NewPrayerRequest, PrayerRequest, RequestId, UserId};

const SNAPSHOT_BUFFER: usize = 16;
const CHANGE_BUFFER: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("prayer request not found: {0}")]
    NotFound(RequestId),
    #[error("identity {uid} already marked request {id}")]
    AlreadyApplied { id: RequestId, uid: UserId },
    #[error("permission denied")]
    PermissionDenied,
    #[error("subscription closed")]
    Closed,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for LedgerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_REQUEST_NOT_FOUND",
            Self::AlreadyApplied { .. } => "E_ALREADY_APPLIED",
            Self::PermissionDenied => "E_PERMISSION_DENIED",
            Self::Closed => "E_SUBSCRIPTION_CLOSED",
            Self::Unavailable(_) => "E_LEDGER_UNAVAILABLE",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Database(_))
    }
}

/// An increment-and-add-to-set update applied as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicUpdate {
    pub increment: u32,
    pub add_to_set: UserId,
}

impl AtomicUpdate {
    /// The "I'm praying" mark: count +1 and record the identity.
    #[must_use]
    pub fn praying(uid: UserId) -> Self {
        Self { increment: 1, add_to_set: uid }
    }
}

pub type Snapshot = Vec<PrayerRequest>;

/// A live feed of full-list snapshots. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Result<Snapshot, LedgerError>>,
    feed: Option<JoinHandle<()>>,
}

impl Subscription {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Result<Snapshot, LedgerError>>, feed: Option<JoinHandle<()>>) -> Self {
        Self { rx, feed }
    }

    /// Next snapshot, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Snapshot, LedgerError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }
}

#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Subscribe to the list ordered by `created_at` descending. The first
    /// snapshot is delivered immediately.
    async fn subscribe(&self) -> Result<Subscription, LedgerError>;

    async fn create(&self, request: NewPrayerRequest) -> Result<RequestId, LedgerError>;

    /// Apply `update` iff `update.add_to_set` is not already in the set.
    async fn update_atomic(&self, id: RequestId, update: AtomicUpdate) -> Result<(), LedgerError>;

    async fn delete_by_id(&self, id: RequestId) -> Result<(), LedgerError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    changes: broadcast::Sender<()>,
}

impl PgLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { pool, changes }
    }

    fn announce(&self) {
        // No receivers just means nobody is watching.
        let _ = self.changes.send(());
    }
}

/// Load every request, newest first, ties in insertion order.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_requests(pool: &PgPool) -> Result<Snapshot, LedgerError> {
    let rows = sqlx::query(
        r"SELECT id, title, body, author_label, owner_id,
                 (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT AS created_ms,
                 prayer_count, prayed_by
          FROM prayer_requests
          ORDER BY created_at DESC, seq ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(classify)?;

    rows.into_iter()
        .map(|r| -> Result<PrayerRequest, LedgerError> {
            let count: i32 = r.try_get("prayer_count")?;
            let prayed_by: Vec<Uuid> = r.try_get("prayed_by")?;
            Ok(PrayerRequest {
                id: r.try_get("id")?,
                title: r.try_get("title")?,
                body: r.try_get("body")?,
                author_label: r.try_get("author_label")?,
                owner_id: r.try_get("owner_id")?,
                created_at: r.try_get("created_ms")?,
                prayer_count: u32::try_from(count).unwrap_or(0),
                prayed_by: prayed_by.into_iter().collect::<BTreeSet<_>>(),
            })
        })
        .collect()
}

fn classify(err: sqlx::Error) -> LedgerError {
    // 42501: insufficient_privilege (row-level security or revoked grants).
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("42501") {
            return LedgerError::PermissionDenied;
        }
    }
    LedgerError::Database(err)
}

#[async_trait::async_trait]
impl Ledger for PgLedger {
    async fn subscribe(&self) -> Result<Subscription, LedgerError> {
        // Subscribe to changes before the first read so nothing slips between.
        let mut changes = self.changes.subscribe();
        let first = list_requests(&self.pool).await?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let pool = self.pool.clone();
        let feed = tokio::spawn(async move {
            if tx.send(Ok(first)).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let snapshot = list_requests(&pool).await;
                if let Err(e) = &snapshot {
                    warn!(error = %e, "ledger: snapshot query failed");
                }
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
            debug!("ledger: feed ended");
        });

        Ok(Subscription::new(rx, Some(feed)))
    }

    async fn create(&self, request: NewPrayerRequest) -> Result<RequestId, LedgerError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r"INSERT INTO prayer_requests (id, title, body, author_label, owner_id)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.body)
        .bind(&request.author_label)
        .bind(request.owner_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        self.announce();
        Ok(id)
    }

    async fn update_atomic(&self, id: RequestId, update: AtomicUpdate) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r"UPDATE prayer_requests
              SET prayer_count = prayer_count + $3,
                  prayed_by = array_append(prayed_by, $2)
              WHERE id = $1 AND NOT ($2 = ANY(prayed_by))",
        )
        .bind(id)
        .bind(update.add_to_set)
        .bind(i32::try_from(update.increment).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM prayer_requests WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(classify)?;
            return Err(if exists {
                LedgerError::AlreadyApplied { id, uid: update.add_to_set }
            } else {
                LedgerError::NotFound(id)
            });
        }

        self.announce();
        Ok(())
    }

    async fn delete_by_id(&self, id: RequestId) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM prayer_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }

        self.announce();
        Ok(())
    }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
