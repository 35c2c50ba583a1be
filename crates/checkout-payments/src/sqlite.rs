//! Durable Transaction Store (SQLite)
//!
//! File-backed implementation of [`TransactionStore`]. The pool holds a
//! single connection, so writers serialize, and each upsert runs its
//! read-merge-write inside one database transaction: concurrent deliveries
//! for the same id cannot interleave, and the reported outcome is exact.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::{PaymentError, Result};
use crate::transaction::{
    resolve, TransactionRecord, TransactionStatus, TransactionStore, UpsertOutcome,
};

const SELECT_BY_ID: &str = "SELECT id, amount, currency, status, created, payment_method, \
     metadata, failure_reason, received_at FROM transactions WHERE id = ?1";

/// SQLite-backed transaction store
pub struct SqliteTransactionStore {
    pool: SqlitePool,
}

impl SqliteTransactionStore {
    /// Open (or create) the database file at `path` and ensure the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                 id             TEXT PRIMARY KEY,
                 amount         INTEGER NOT NULL,
                 currency       TEXT NOT NULL,
                 status         TEXT NOT NULL,
                 created        INTEGER NOT NULL,
                 payment_method TEXT,
                 metadata       TEXT NOT NULL DEFAULT '{}',
                 failure_reason TEXT,
                 received_at    INTEGER NOT NULL
             )",
        )
        .execute(&pool)
        .await
        .map_err(storage_err)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TransactionStore for SqliteTransactionStore {
    async fn upsert(&self, record: TransactionRecord) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let previous = sqlx::query(SELECT_BY_ID)
            .bind(&record.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?
            .as_ref()
            .map(row_to_record)
            .transpose()?;

        let (next, outcome) = resolve(previous.as_ref(), record);
        let metadata_text =
            serde_json::to_string(&next.metadata).map_err(|e| PaymentError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO transactions
                 (id, amount, currency, status, created, payment_method, metadata, failure_reason, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 amount = excluded.amount,
                 currency = excluded.currency,
                 status = excluded.status,
                 created = excluded.created,
                 payment_method = excluded.payment_method,
                 metadata = excluded.metadata,
                 failure_reason = excluded.failure_reason,
                 received_at = excluded.received_at",
        )
        .bind(&next.id)
        .bind(next.amount)
        .bind(&next.currency)
        .bind(next.status.as_str())
        .bind(next.created)
        .bind(&next.payment_method)
        .bind(metadata_text)
        .bind(&next.failure_reason)
        .bind(next.received_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        Ok(outcome)
    }

    async fn get(&self, id: &str) -> Result<Option<TransactionRecord>> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_record).transpose()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord> {
    let status_text: String = row.get("status");
    let status = TransactionStatus::parse(&status_text)
        .ok_or_else(|| PaymentError::Storage(format!("unknown stored status: {status_text}")))?;

    let metadata_text: String = row.get("metadata");
    let metadata: HashMap<String, String> =
        serde_json::from_str(&metadata_text).map_err(|e| PaymentError::Storage(e.to_string()))?;

    Ok(TransactionRecord {
        id: row.get("id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status,
        created: row.get("created"),
        payment_method: row.get("payment_method"),
        metadata,
        failure_reason: row.get("failure_reason"),
        received_at: row.get("received_at"),
    })
}

fn storage_err(err: sqlx::Error) -> PaymentError {
    PaymentError::Storage(err.to_string())
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

    #[tokio::test]
    async fn round_trip_preserves_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTransactionStore::open(dir.path().join("tx.db"))
            .await
            .unwrap();

        let outcome = store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 10))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let fetched = store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(fetched, record("pi_1", TransactionStatus::Succeeded, 10));
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");

        {
            let store = SqliteTransactionStore::open(&path).await.unwrap();
            store
                .upsert(record("pi_1", TransactionStatus::Succeeded, 10))
                .await
                .unwrap();
        }

        let reopened = SqliteTransactionStore::open(&path).await.unwrap();
        let fetched = reopened.get("pi_1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Succeeded);
        assert_eq!(fetched.amount, 10000);
    }

    #[tokio::test]
    async fn duplicate_and_regression_outcomes_match_the_merge_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTransactionStore::open(dir.path().join("tx.db"))
            .await
            .unwrap();

        store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 10))
            .await
            .unwrap();

        let duplicate = store
            .upsert(record("pi_1", TransactionStatus::Succeeded, 20))
            .await
            .unwrap();
        assert_eq!(duplicate, UpsertOutcome::Duplicate);

        let stale = store
            .upsert(record("pi_1", TransactionStatus::RequiresAction, 30))
            .await
            .unwrap();
        assert_eq!(
            stale,
            UpsertOutcome::StaleRegression {
                stored: TransactionStatus::Succeeded
            }
        );

        // Stored status untouched, observation time advanced
        let fetched = store.get("pi_1").await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Succeeded);
        assert_eq!(fetched.received_at, 30);
    }

    #[tokio::test]
    async fn failure_reason_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTransactionStore::open(dir.path().join("tx.db"))
            .await
            .unwrap();

        let mut failed = record("pi_2", TransactionStatus::Failed, 10);
        failed.failure_reason = Some("Your card was declined.".into());
        store.upsert(failed).await.unwrap();

        let fetched = store.get("pi_2").await.unwrap().unwrap();
        assert_eq!(
            fetched.failure_reason.as_deref(),
            Some("Your card was declined.")
        );
    }
}
