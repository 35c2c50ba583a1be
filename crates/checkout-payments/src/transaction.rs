//! Transaction Records and Storage
//!
//! The system of record for observed payment lifecycles. Records are keyed
//! by the processor-assigned intent id. Deliveries are at-least-once and
//! unordered, so the merge rules here make re-applying an already-applied
//! `(id, status)` pair a no-op and keep terminal statuses from regressing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Payment lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Succeeded,
    Failed,
    Canceled,
    RequiresAction,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Canceled => "canceled",
            TransactionStatus::RequiresAction => "requires_action",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(TransactionStatus::Succeeded),
            "failed" => Some(TransactionStatus::Failed),
            "canceled" => Some(TransactionStatus::Canceled),
            "requires_action" => Some(TransactionStatus::RequiresAction),
            _ => None,
        }
    }

    /// Terminal statuses never regress back to `requires_action`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Succeeded | TransactionStatus::Failed | TransactionStatus::Canceled
        )
    }
}

/// A persisted transaction record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Processor-assigned identifier, stable across redeliveries
    pub id: String,

    /// Amount in minor currency units
    pub amount: i64,

    /// Three-letter currency code
    pub currency: String,

    /// Current lifecycle status
    pub status: TransactionStatus,

    /// Creation time at the processor (unix seconds), immutable
    pub created: i64,

    /// Opaque reference to the payment instrument
    pub payment_method: Option<String>,

    /// Application-supplied tags, not interpreted here
    pub metadata: HashMap<String, String>,

    /// Present only for failed payments
    pub failure_reason: Option<String>,

    /// When this process observed the event (unix seconds)
    pub received_at: i64,
}

/// What an upsert did, reported from inside the atomic section so callers
/// can gate side effects without a second read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of this id
    Inserted,

    /// Status moved; `previous` is the status it moved from
    Transitioned { previous: TransactionStatus },

    /// Same (id, status) seen again; nothing changed
    Duplicate,

    /// Incoming event would regress a terminal status; stored record kept
    StaleRegression { stored: TransactionStatus },
}

impl UpsertOutcome {
    /// True when the stored status genuinely changed
    pub fn status_changed(&self) -> bool {
        matches!(
            self,
            UpsertOutcome::Inserted | UpsertOutcome::Transitioned { .. }
        )
    }
}

/// Pure merge of an incoming record over the stored one. Both store
/// implementations call this inside their atomic sections so resolution and
/// reported outcome stay consistent.
pub(crate) fn resolve(
    previous: Option<&TransactionRecord>,
    incoming: TransactionRecord,
) -> (TransactionRecord, UpsertOutcome) {
    let Some(prev) = previous else {
        return (incoming, UpsertOutcome::Inserted);
    };

    if prev.status == incoming.status {
        // Redelivery of an already-applied transition. Keep the stored
        // record; only the observation timestamp may move forward.
        let mut kept = prev.clone();
        kept.received_at = kept.received_at.max(incoming.received_at);
        return (kept, UpsertOutcome::Duplicate);
    }

    if prev.status.is_terminal() && !incoming.status.is_terminal() {
        let stored = prev.status;
        let mut kept = prev.clone();
        kept.received_at = kept.received_at.max(incoming.received_at);
        return (kept, UpsertOutcome::StaleRegression { stored });
    }

    let previous_status = prev.status;
    let mut next = incoming;
    next.received_at = next.received_at.max(prev.received_at);
    (
        next,
        UpsertOutcome::Transitioned {
            previous: previous_status,
        },
    )
}

/// Keyed, durable storage for transaction records
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Atomically merge `record` into the store and report what changed.
    /// Concurrent upserts for the same id must serialize.
    async fn upsert(&self, record: TransactionRecord) -> Result<UpsertOutcome>;

    /// Point lookup by processor-assigned id
    async fn get(&self, id: &str) -> Result<Option<TransactionRecord>>;
}

/// In-memory store for tests and development
pub struct MemoryTransactionStore {
    records: RwLock<HashMap<String, TransactionRecord>>,
}

impl Default for MemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn upsert(&self, record: TransactionRecord) -> Result<UpsertOutcome> {
        let mut records = self
            .records
            .write()
            .map_err(|_| PaymentError::Storage("transaction store lock poisoned".into()))?;

        let (next, outcome) = resolve(records.get(&record.id), record);
        records.insert(next.id.clone(), next);

        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| PaymentError::Storage("transaction store lock poisoned".into()))?;

        Ok(records.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: TransactionStatus, received_at: i64) -> TransactionRecord {
        TransactionRecord {
            id: id.into(),
            amount: 10000,
            currency: "brl".into(),
            status,
            created: 1_700_000_000,
            payment_method: Some("pm_1".into()),
            metadata: HashMap::from([("order_id".to_string(), "order_1".to_string())]),
            failure_reason: None,
            received_at,
        }
    }

    #[test]
    fn first_sighting_inserts() {
        let incoming = record("pi_1", TransactionStatus::RequiresAction, 10);
        let (next, outcome) = resolve(None, incoming.clone());
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(next, incoming);
    }

    #[test]
    fn redelivery_of_same_status_is_a_duplicate() {
        let stored = record("pi_1", TransactionStatus::Succeeded, 10);
        let redelivery = record("pi_1", TransactionStatus::Succeeded, 20);

        let (next, outcome) = resolve(Some(&stored), redelivery);
        assert_eq!(outcome, UpsertOutcome::Duplicate);
        assert_eq!(next.status, TransactionStatus::Succeeded);
        // Observation time still moves forward for latency auditing
        assert_eq!(next.received_at, 20);
    }

    #[test]
    fn terminal_status_never_regresses() {
        let stored = record("pi_1", TransactionStatus::Succeeded, 10);
        let late = record("pi_1", TransactionStatus::RequiresAction, 20);

        let (next, outcome) = resolve(Some(&stored), late);
        assert_eq!(
            outcome,
            UpsertOutcome::StaleRegression {
                stored: TransactionStatus::Succeeded
            }
        );
        assert_eq!(next.status, TransactionStatus::Succeeded);
    }

    #[test]
    fn forward_transition_applies() {
        let stored = record("pi_1", TransactionStatus::RequiresAction, 10);
        let settled = record("pi_1", TransactionStatus::Succeeded, 20);

        let (next, outcome) = resolve(Some(&stored), settled);
        assert_eq!(
            outcome,
            UpsertOutcome::Transitioned {
                previous: TransactionStatus::RequiresAction
            }
        );
        assert_eq!(next.status, TransactionStatus::Succeeded);
        assert!(outcome.status_changed());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryTransactionStore::new();

        let outcome = store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 10))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let fetched = store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Succeeded);
        assert!(store.get("pi_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_reports_duplicates() {
        let store = MemoryTransactionStore::new();

        store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 10))
            .await
            .unwrap();
        let outcome = store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 20))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Duplicate);
    }
}
