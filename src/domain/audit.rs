//! Append-only audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

pub mod actions {
    pub const PAYMENT_CREATED: &str = "payment.created";
    pub const PAYMENT_TRANSITION: &str = "payment.transition";
    pub const PAYMENT_TRANSITION_REJECTED: &str = "payment.transition_rejected";
    pub const WALLET_CREATED: &str = "wallet.created";
    pub const WALLET_DEPOSIT: &str = "wallet.deposit";
    pub const WALLET_WITHDRAW: &str = "wallet.withdraw";
    pub const WALLET_WITHDRAW_REJECTED: &str = "wallet.withdraw_rejected";
    pub const WALLET_TRANSFER_DEBIT: &str = "wallet.transfer_debit";
    pub const WALLET_TRANSFER_CREDIT: &str = "wallet.transfer_credit";
    pub const WALLET_TRANSFER_REJECTED: &str = "wallet.transfer_rejected";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Payment,
    Wallet,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Payment => "payment",
            EntityType::Wallet => "wallet",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "payment" => Ok(EntityType::Payment),
            "wallet" => Ok(EntityType::Wallet),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: &str,
        entity_type: EntityType,
        entity_id: Uuid,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.to_string(),
            entity_type,
            entity_id,
            actor_id: actor_id.into(),
            before: None,
            after: None,
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
