//! Postgres implementation of the persistence ports.
//!
//! Check-then-write sequences lock their rows with `SELECT ... FOR UPDATE`
//! inside the unit of work's transaction. The schema lives in `migrations/`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    AuditRecord, EntityType, LedgerEntry, Payment, PaymentStatus, Wallet,
};
use crate::ports::{Database, RepositoryError, RepositoryResult, UnitOfWork};

/// Postgres-backed persistence.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn payment(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn wallet(&self, id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WalletRow::into_domain).transpose()
    }

    async fn ledger_entries(&self, wallet_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntryRow>(
            "SELECT * FROM ledger_entries WHERE wallet_id = $1 ORDER BY created_at ASC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LedgerEntryRow::into_domain).collect()
    }

    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> RepositoryResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, entity_id, entity_type, action, actor, old_val, new_val, metadata, timestamp
            FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY timestamp DESC
            "#,
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRow::into_domain).collect()
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn payment_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(PaymentRow::into_domain).transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, owner_id, amount, currency, status,
                idempotency_key, external_reference, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.owner_id)
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.idempotency_key)
        .bind(&payment.external_reference)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE payments SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("payment {}", id)));
        }
        Ok(())
    }

    async fn wallet_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(WalletRow::into_domain).transpose()
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, owner_id, balance, asset_type, kind, is_primary, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.owner_id)
        .bind(&wallet.balance)
        .bind(&wallet.asset_type)
        .bind(wallet.kind.as_str())
        .bind(wallet.is_primary)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_wallet_balance(
        &mut self,
        id: Uuid,
        balance: &BigDecimal,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE wallets SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(balance)
            .bind(updated_at)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("wallet {}", id)));
        }
        Ok(())
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, wallet_id, kind, amount, asset_type, counterparty_wallet_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.kind.as_str())
        .bind(&entry.amount)
        .bind(&entry.asset_type)
        .bind(entry.counterparty_wallet_id)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, entity_id, entity_type, action, actor, old_val, new_val, metadata, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.entity_id)
        .bind(record.entity_type.as_str())
        .bind(&record.action)
        .bind(&record.actor_id)
        .bind(&record.before)
        .bind(&record.after)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn corrupt(column: &str, err: String) -> RepositoryError {
    RepositoryError::Database(format!("invalid {} column: {}", column, err))
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    owner_id: String,
    amount: BigDecimal,
    currency: String,
    status: String,
    idempotency_key: String,
    external_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> RepositoryResult<Payment> {
        Ok(Payment {
            id: self.id,
            owner_id: self.owner_id,
            amount: self.amount,
            currency: self.currency,
            status: self.status.parse().map_err(|e| corrupt("status", e))?,
            idempotency_key: self.idempotency_key,
            external_reference: self.external_reference,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    owner_id: String,
    balance: BigDecimal,
    asset_type: String,
    kind: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_domain(self) -> RepositoryResult<Wallet> {
        Ok(Wallet {
            id: self.id,
            owner_id: self.owner_id,
            balance: self.balance,
            asset_type: self.asset_type,
            kind: self.kind.parse().map_err(|e| corrupt("kind", e))?,
            is_primary: self.is_primary,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    wallet_id: Uuid,
    kind: String,
    amount: BigDecimal,
    asset_type: String,
    counterparty_wallet_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl LedgerEntryRow {
    fn into_domain(self) -> RepositoryResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: self.id,
            wallet_id: self.wallet_id,
            kind: self.kind.parse().map_err(|e| corrupt("kind", e))?,
            amount: self.amount,
            asset_type: self.asset_type,
            counterparty_wallet_id: self.counterparty_wallet_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    entity_id: Uuid,
    entity_type: String,
    action: String,
    actor: String,
    old_val: Option<serde_json::Value>,
    new_val: Option<serde_json::Value>,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn into_domain(self) -> RepositoryResult<AuditRecord> {
        Ok(AuditRecord {
            id: self.id,
            action: self.action,
            entity_type: self
                .entity_type
                .parse()
                .map_err(|e| corrupt("entity_type", e))?,
            entity_id: self.entity_id,
            actor_id: self.actor,
            before: self.old_val,
            after: self.new_val,
            metadata: self.metadata,
            created_at: self.timestamp,
        })
    }
}
