use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{AuditRecord, EntityType};
use crate::error::AppError;
use crate::ports::{Database, RepositoryResult, UnitOfWork};

/// Append-only sink for before/after snapshots.
#[derive(Clone)]
pub struct AuditTrail {
    db: Arc<dyn Database>,
}

impl AuditTrail {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Transactional write: commits or aborts together with `uow`.
    pub async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        record: &AuditRecord,
    ) -> Result<(), AppError> {
        uow.append_audit(record).await?;
        Ok(())
    }

    /// Forensic write for attempts that changed no state. Runs in its own
    /// unit of work; a failure is logged and never reaches the caller.
    pub async fn record_detached(&self, record: AuditRecord) {
        if let Err(e) = self.append_in_own_scope(&record).await {
            tracing::error!(
                action = %record.action,
                entity_id = %record.entity_id,
                error = %e,
                "failed to write forensic audit record"
            );
        }
    }

    async fn append_in_own_scope(&self, record: &AuditRecord) -> RepositoryResult<()> {
        let mut uow = self.db.begin().await?;
        uow.append_audit(record).await?;
        uow.commit().await
    }

    /// Records for one entity, newest first.
    pub async fn history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AuditRecord>, AppError> {
        Ok(self.db.audit_history(entity_type, entity_id).await?)
    }
}
