//! Transitions that depend on an external processor call.
//!
//! The call is never made while a row lock or open transaction is held:
//!
//! 1. `preflight` reads the payment outside any unit of work and checks the
//!    guard table.
//! 2. `call_processor` talks to the processor with no scope open.
//! 3. `commit_acknowledged` opens a fresh unit of work, re-reads the payment
//!    under lock and commits only if its status is still the one preflight
//!    saw. Any drift is rejected and left for reconciliation.
//!
//! A timeout leaves the payment untouched: the external outcome is unknown
//! and must be settled by reconciliation, not by marking the payment failed.

use serde_json::json;
use uuid::Uuid;

use super::payments::payment_not_found;
use super::PaymentStateMachine;
use crate::domain::{Actor, Payment, PaymentStatus};
use crate::error::AppError;
use crate::processor::{ProcessorError, ProcessorReceipt};

/// A payment that passed the guard check before the external call.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub payment: Payment,
    pub external_reference: String,
    pub target: PaymentStatus,
}

/// The processor accepted the call; the local commit is still pending.
#[derive(Debug, Clone)]
pub struct ProcessorAcknowledged {
    pub preflight: Preflight,
    pub receipt: ProcessorReceipt,
}

impl PaymentStateMachine {
    /// Non-transactional read plus guard check.
    pub async fn preflight(
        &self,
        actor: &Actor,
        id: Uuid,
        target: PaymentStatus,
    ) -> Result<Preflight, AppError> {
        if !matches!(target, PaymentStatus::Approved | PaymentStatus::Confirmed) {
            return Err(AppError::Validation(format!(
                "{} is not reached through the payment processor",
                target
            )));
        }

        let payment = self.get_payment(id).await?;

        if !payment.status.can_transition_to(target) {
            return Err(self
                .reject(actor, &payment, target, json!({ "phase": "preflight" }))
                .await);
        }

        let external_reference = payment.external_reference.clone().ok_or_else(|| {
            AppError::Validation(format!(
                "payment {} has no external reference for the processor",
                payment.id
            ))
        })?;

        Ok(Preflight {
            payment,
            external_reference,
            target,
        })
    }

    /// Runs the processor call with no unit of work open.
    pub async fn call_processor(
        &self,
        preflight: Preflight,
        tx_reference: Option<&str>,
    ) -> Result<ProcessorAcknowledged, AppError> {
        let processor = self.processor.as_ref().ok_or_else(|| {
            AppError::ProcessorConfig("no payment processor is configured".to_string())
        })?;

        let result = match preflight.target {
            PaymentStatus::Confirmed => {
                let tx_reference = tx_reference.ok_or_else(|| {
                    AppError::Validation("transaction_reference is required".to_string())
                })?;
                processor
                    .complete(&preflight.external_reference, tx_reference)
                    .await
            }
            _ => processor.approve(&preflight.external_reference).await,
        };

        match result {
            Ok(receipt) => Ok(ProcessorAcknowledged { preflight, receipt }),
            Err(ProcessorError::Timeout) => {
                tracing::warn!(
                    payment_id = %preflight.payment.id,
                    external_reference = %preflight.external_reference,
                    target = %preflight.target,
                    "processor call timed out, outcome unknown; payment left unchanged"
                );
                Err(ProcessorError::Timeout.into())
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %preflight.payment.id,
                    external_reference = %preflight.external_reference,
                    error = %e,
                    "processor call failed"
                );
                Err(e.into())
            }
        }
    }

    /// Re-validates under a fresh lock and commits the acknowledged transition.
    pub async fn commit_acknowledged(
        &self,
        actor: &Actor,
        ack: ProcessorAcknowledged,
    ) -> Result<Payment, AppError> {
        let ProcessorAcknowledged { preflight, receipt } = ack;
        let id = preflight.payment.id;

        let mut uow = self.db.begin().await?;
        let current = uow
            .payment_for_update(id)
            .await?
            .ok_or_else(|| payment_not_found(id))?;

        let metadata = json!({
            "phase": "commit",
            "processor_reference": receipt.reference,
            "processor_status": receipt.status,
        });

        if current.status != preflight.payment.status {
            tracing::error!(
                payment_id = %id,
                expected = %preflight.payment.status,
                found = %current.status,
                processor_reference = %receipt.reference,
                "payment changed during processor call; needs reconciliation"
            );
            if let Err(e) = uow.rollback().await {
                tracing::warn!(payment_id = %id, error = %e, "rollback failed");
            }
            let drift = json!({
                "phase": "commit",
                "expected_status": preflight.payment.status,
                "processor_reference": receipt.reference,
                "processor_status": receipt.status,
            });
            return Err(self.reject(actor, &current, preflight.target, drift).await);
        }

        self.apply_transition(
            uow,
            actor,
            current,
            preflight.target,
            metadata,
        )
        .await
    }

    /// Approves through the processor.
    pub async fn approve_with_processor(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Payment, AppError> {
        let preflight = self.preflight(actor, id, PaymentStatus::Approved).await?;
        let ack = self.call_processor(preflight, None).await?;
        self.commit_acknowledged(actor, ack).await
    }

    /// Completes through the processor and confirms locally.
    pub async fn confirm_with_processor(
        &self,
        actor: &Actor,
        id: Uuid,
        tx_reference: &str,
    ) -> Result<Payment, AppError> {
        let preflight = self.preflight(actor, id, PaymentStatus::Confirmed).await?;
        let ack = self.call_processor(preflight, Some(tx_reference)).await?;
        self.commit_acknowledged(actor, ack).await
    }
}
