//! Boundary to the external payment processor (third-party payment rail).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use self::http::{HttpPaymentProcessor, ProcessorConfig};

/// Categorized processor failure.
///
/// `Timeout` means the outcome of the external side effect is unknown; it is
/// neither a success nor a definitive failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("processor configuration error: {0}")]
    Configuration(String),

    #[error("rejected by processor: {0}")]
    Rejected(String),

    #[error("processor call timed out")]
    Timeout,

    #[error("network failure: {0}")]
    Network(String),
}

/// Processor acknowledgement of an approve or complete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorReceipt {
    pub reference: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn approve(&self, external_ref: &str) -> Result<ProcessorReceipt, ProcessorError>;

    async fn complete(
        &self,
        external_ref: &str,
        tx_reference: &str,
    ) -> Result<ProcessorReceipt, ProcessorError>;
}
