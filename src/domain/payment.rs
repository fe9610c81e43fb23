//! Payment entity and its lifecycle guard table.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Approved,
    Confirmed,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Initiated,
        PaymentStatus::Approved,
        PaymentStatus::Confirmed,
        PaymentStatus::Cancelled,
        PaymentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Guard table: the statuses from which `self` may be entered.
    pub fn allowed_sources(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Initiated => &[],
            PaymentStatus::Approved => &[PaymentStatus::Initiated],
            PaymentStatus::Confirmed
            | PaymentStatus::Cancelled
            | PaymentStatus::Failed => &[PaymentStatus::Initiated, PaymentStatus::Approved],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        target.allowed_sources().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        PaymentStatus::ALL
            .iter()
            .all(|target| !self.can_transition_to(*target))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown payment status '{}'", value))
    }
}

/// A money-moving payment. `amount` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub owner_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        owner_id: String,
        amount: BigDecimal,
        currency: String,
        idempotency_key: String,
        external_reference: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            amount,
            currency,
            status: PaymentStatus::Initiated,
            idempotency_key,
            external_reference,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot used for audit before/after records.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status.as_str(),
            "amount": self.amount.to_string(),
            "currency": self.currency,
            "external_reference": self.external_reference,
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn guard_table_edges() {
        assert!(Initiated.can_transition_to(Approved));
        assert!(Initiated.can_transition_to(Confirmed));
        assert!(Approved.can_transition_to(Confirmed));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(Initiated.can_transition_to(Failed));

        assert!(!Approved.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Initiated));
        assert!(!Confirmed.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for status in [Confirmed, Cancelled, Failed] {
            assert!(status.is_terminal(), "{} should be terminal", status);
            for target in PaymentStatus::ALL {
                assert!(!status.can_transition_to(target));
            }
        }
        assert!(!Initiated.is_terminal());
        assert!(!Approved.is_terminal());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("confirmed".parse::<PaymentStatus>(), Ok(Confirmed));
        assert_eq!("CANCELLED".parse::<PaymentStatus>(), Ok(Cancelled));
        assert!("settled".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn status_serializes_screaming_case() {
        assert_eq!(serde_json::to_string(&Initiated).unwrap(), "\"INITIATED\"");
    }
}
