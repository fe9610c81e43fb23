//! Payment lifecycle engine.
//!
//! Every transition reads the payment under a row lock, checks the guard
//! table, and writes the new status together with its audit record in one
//! unit of work. Rejected attempts are audited after the unit of work has
//! been released.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::assets::AssetAllowList;
use crate::domain::{actions, Actor, AuditRecord, EntityType, Payment, PaymentStatus};
use crate::error::AppError;
use crate::guard::IdempotencyGate;
use crate::ports::{Database, UnitOfWork};
use crate::processor::PaymentProcessor;
use crate::services::AuditTrail;
use crate::validation::{
    sanitize_string, validate_amount, validate_max_len, EXTERNAL_REFERENCE_MAX_LEN,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub amount: BigDecimal,
    pub currency: String,
    pub idempotency_key: String,
    pub external_reference: Option<String>,
}

#[derive(Clone)]
pub struct PaymentStateMachine {
    pub(super) db: Arc<dyn Database>,
    pub(super) audit: AuditTrail,
    assets: Arc<AssetAllowList>,
    pub(super) processor: Option<Arc<dyn PaymentProcessor>>,
}

impl PaymentStateMachine {
    pub fn new(db: Arc<dyn Database>, assets: Arc<AssetAllowList>) -> Self {
        Self {
            audit: AuditTrail::new(Arc::clone(&db)),
            db,
            assets,
            processor: None,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub async fn create_payment(
        &self,
        actor: &Actor,
        input: CreatePayment,
    ) -> Result<Payment, AppError> {
        validate_amount(&input.amount)?;
        self.assets.check("currency", &input.currency)?;
        IdempotencyGate::validate_key(Some(input.idempotency_key.as_str()))?;

        let external_reference = input
            .external_reference
            .as_deref()
            .map(sanitize_string)
            .filter(|reference| !reference.is_empty());
        if let Some(reference) = &external_reference {
            validate_max_len("external_reference", reference, EXTERNAL_REFERENCE_MAX_LEN)?;
        }

        let payment = Payment::new(
            actor.id.clone(),
            input.amount,
            input.currency,
            input.idempotency_key,
            external_reference,
        );

        let mut uow = self.db.begin().await?;
        uow.insert_payment(&payment).await?;
        self.audit
            .record(
                uow.as_mut(),
                &AuditRecord::new(
                    actions::PAYMENT_CREATED,
                    EntityType::Payment,
                    payment.id,
                    actor.id.clone(),
                )
                .after(payment.snapshot()),
            )
            .await?;
        uow.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            actor_id = %actor.id,
            amount = %payment.amount,
            currency = %payment.currency,
            "payment created"
        );
        Ok(payment)
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Payment, AppError> {
        self.db
            .payment(id)
            .await?
            .ok_or_else(|| payment_not_found(id))
    }

    /// Moves a payment to `target` if the guard table allows it.
    pub async fn transition(
        &self,
        actor: &Actor,
        id: Uuid,
        target: PaymentStatus,
    ) -> Result<Payment, AppError> {
        let mut uow = self.db.begin().await?;
        let current = uow
            .payment_for_update(id)
            .await?
            .ok_or_else(|| payment_not_found(id))?;
        self.apply_transition(uow, actor, current, target, json!({}))
            .await
    }

    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<Payment, AppError> {
        self.transition(actor, id, PaymentStatus::Approved).await
    }

    pub async fn confirm(&self, actor: &Actor, id: Uuid) -> Result<Payment, AppError> {
        self.transition(actor, id, PaymentStatus::Confirmed).await
    }

    pub async fn cancel(&self, actor: &Actor, id: Uuid) -> Result<Payment, AppError> {
        self.transition(actor, id, PaymentStatus::Cancelled).await
    }

    pub async fn fail(&self, actor: &Actor, id: Uuid) -> Result<Payment, AppError> {
        self.transition(actor, id, PaymentStatus::Failed).await
    }

    /// Validates and commits a transition on a payment already locked by `uow`.
    pub(super) async fn apply_transition(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        actor: &Actor,
        current: Payment,
        target: PaymentStatus,
        metadata: Value,
    ) -> Result<Payment, AppError> {
        if !current.status.can_transition_to(target) {
            if let Err(e) = uow.rollback().await {
                tracing::warn!(payment_id = %current.id, error = %e, "rollback failed");
            }
            return Err(self.reject(actor, &current, target, metadata).await);
        }

        let mut updated = current.clone();
        updated.status = target;
        updated.updated_at = Utc::now();

        uow.update_payment_status(updated.id, target, updated.updated_at)
            .await?;
        self.audit
            .record(
                uow.as_mut(),
                &AuditRecord::new(
                    actions::PAYMENT_TRANSITION,
                    EntityType::Payment,
                    updated.id,
                    actor.id.clone(),
                )
                .before(current.snapshot())
                .after(updated.snapshot())
                .metadata(with_edge(metadata, current.status, target)),
            )
            .await?;
        uow.commit().await?;

        tracing::info!(
            payment_id = %updated.id,
            actor_id = %actor.id,
            from = %current.status,
            to = %target,
            "payment transitioned"
        );
        Ok(updated)
    }

    /// Audits a rejected attempt and builds the error to return.
    pub(super) async fn reject(
        &self,
        actor: &Actor,
        payment: &Payment,
        target: PaymentStatus,
        metadata: Value,
    ) -> AppError {
        tracing::warn!(
            payment_id = %payment.id,
            actor_id = %actor.id,
            from = %payment.status,
            to = %target,
            "rejected invalid payment transition"
        );
        self.audit
            .record_detached(
                AuditRecord::new(
                    actions::PAYMENT_TRANSITION_REJECTED,
                    EntityType::Payment,
                    payment.id,
                    actor.id.clone(),
                )
                .before(payment.snapshot())
                .metadata(with_edge(metadata, payment.status, target)),
            )
            .await;

        AppError::InvalidTransition {
            from: payment.status,
            to: target,
        }
    }
}

pub(super) fn payment_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("payment {} not found", id))
}

fn with_edge(metadata: Value, from: PaymentStatus, to: PaymentStatus) -> Value {
    let mut map = match metadata {
        Value::Object(map) => map,
        Value::Null => Default::default(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("detail".to_string(), other);
            map
        }
    };
    map.insert("from".to_string(), json!(from.as_str()));
    map.insert("to".to_string(), json!(to.as_str()));
    Value::Object(map)
}
