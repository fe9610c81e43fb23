//! Persistence boundary for the payment and wallet engines.
//!
//! Every engine mutation runs inside exactly one [`UnitOfWork`]. Reads taken
//! through `*_for_update` must lock the row (or run under serializable
//! isolation) so a check-then-write observes the latest committed value.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AuditRecord, EntityType, LedgerEntry, Payment, PaymentStatus, Wallet};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Entry point to the persistence engine.
#[async_trait]
pub trait Database: Send + Sync {
    /// Opens a transactional scope.
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>>;

    /// Non-transactional read; may be stale by the time it is acted on.
    async fn payment(&self, id: Uuid) -> RepositoryResult<Option<Payment>>;

    async fn wallet(&self, id: Uuid) -> RepositoryResult<Option<Wallet>>;

    async fn ledger_entries(&self, wallet_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>>;

    /// Audit records for one entity, newest first.
    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> RepositoryResult<Vec<AuditRecord>>;
}

/// A transactional scope. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn payment_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Payment>>;

    /// Fails with `Conflict` when (owner, idempotency key) already exists.
    async fn insert_payment(&mut self, payment: &Payment) -> RepositoryResult<()>;

    /// Writes status and timestamp only; the amount column is never touched.
    async fn update_payment_status(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn wallet_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Wallet>>;

    async fn insert_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()>;

    async fn update_wallet_balance(
        &mut self,
        id: Uuid,
        balance: &BigDecimal,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> RepositoryResult<()>;

    async fn append_audit(&mut self, record: &AuditRecord) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;

    async fn rollback(self: Box<Self>) -> RepositoryResult<()>;
}
