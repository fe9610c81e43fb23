//! In-process implementation of the persistence ports.
//!
//! Units of work are serialized through an owned async mutex. Each unit
//! records its writes in a change set that reads consult before the
//! committed state; `commit` applies the change set, dropping it discards it.
//! Work per unit is proportional to what it touches, not to stored history.
//! This gives serializable isolation within one process; it backs tests and
//! single-instance deployments.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{AuditRecord, EntityType, LedgerEntry, Payment, PaymentStatus, Wallet};
use crate::ports::{Database, RepositoryError, RepositoryResult, UnitOfWork};

#[derive(Debug, Default)]
struct MemoryState {
    payments: HashMap<Uuid, Payment>,
    /// (owner, idempotency key) pairs; mirrors the unique index in Postgres.
    payment_keys: HashSet<(String, String)>,
    wallets: HashMap<Uuid, Wallet>,
    ledger: Vec<LedgerEntry>,
    audit: Vec<AuditRecord>,
}

/// Rows written by one unit of work, keyed like `MemoryState`.
#[derive(Debug, Default)]
struct ChangeSet {
    payments: HashMap<Uuid, Payment>,
    payment_keys: HashSet<(String, String)>,
    wallets: HashMap<Uuid, Wallet>,
    ledger: Vec<LedgerEntry>,
    audit: Vec<AuditRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    reject_audit_writes: Arc<AtomicBool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection: make every subsequent audit append fail.
    pub fn reject_audit_writes(&self, reject: bool) {
        self.reject_audit_writes.store(reject, Ordering::SeqCst);
    }

    pub async fn audit_count(&self) -> usize {
        self.state.lock().await.audit.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> RepositoryResult<Box<dyn UnitOfWork>> {
        let committed = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            committed,
            changes: ChangeSet::default(),
            reject_audit_writes: self.reject_audit_writes.load(Ordering::SeqCst),
        }))
    }

    async fn payment(&self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn wallet(&self, id: Uuid) -> RepositoryResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&id).cloned())
    }

    async fn ledger_entries(&self, wallet_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .iter()
            .filter(|entry| entry.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn audit_history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> RepositoryResult<Vec<AuditRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|record| record.entity_type == entity_type && record.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

struct MemoryUnitOfWork {
    committed: OwnedMutexGuard<MemoryState>,
    changes: ChangeSet,
    reject_audit_writes: bool,
}

impl MemoryUnitOfWork {
    fn payment(&self, id: &Uuid) -> Option<&Payment> {
        self.changes
            .payments
            .get(id)
            .or_else(|| self.committed.payments.get(id))
    }

    fn wallet(&self, id: &Uuid) -> Option<&Wallet> {
        self.changes
            .wallets
            .get(id)
            .or_else(|| self.committed.wallets.get(id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn payment_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Payment>> {
        Ok(self.payment(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> RepositoryResult<()> {
        let key = (payment.owner_id.clone(), payment.idempotency_key.clone());
        if self.committed.payment_keys.contains(&key) || self.changes.payment_keys.contains(&key) {
            return Err(RepositoryError::Conflict(format!(
                "payment with idempotency key '{}' already exists",
                payment.idempotency_key
            )));
        }
        self.changes.payment_keys.insert(key);
        self.changes.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        id: Uuid,
        status: PaymentStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut payment = self
            .payment(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", id)))?;
        payment.status = status;
        payment.updated_at = updated_at;
        self.changes.payments.insert(id, payment);
        Ok(())
    }

    async fn wallet_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Wallet>> {
        Ok(self.wallet(&id).cloned())
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()> {
        self.changes.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn update_wallet_balance(
        &mut self,
        id: Uuid,
        balance: &BigDecimal,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut wallet = self
            .wallet(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", id)))?;
        wallet.balance = balance.clone();
        wallet.updated_at = updated_at;
        self.changes.wallets.insert(id, wallet);
        Ok(())
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> RepositoryResult<()> {
        self.changes.ledger.push(entry.clone());
        Ok(())
    }

    async fn append_audit(&mut self, record: &AuditRecord) -> RepositoryResult<()> {
        if self.reject_audit_writes {
            return Err(RepositoryError::Database(
                "audit_logs is not writable".to_string(),
            ));
        }
        self.changes.audit.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let MemoryUnitOfWork {
            mut committed,
            changes,
            ..
        } = *self;
        committed.payments.extend(changes.payments);
        committed.payment_keys.extend(changes.payment_keys);
        committed.wallets.extend(changes.wallets);
        committed.ledger.extend(changes.ledger);
        committed.audit.extend(changes.audit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        Ok(())
    }
}
