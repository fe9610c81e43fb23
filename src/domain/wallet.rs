//! Wallet and ledger entry entities.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    Fiat,
    Crypto,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Fiat => "fiat",
            WalletKind::Crypto => "crypto",
        }
    }
}

impl FromStr for WalletKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fiat" => Ok(WalletKind::Fiat),
            "crypto" => Ok(WalletKind::Crypto),
            other => Err(format!("unknown wallet kind '{}'", other)),
        }
    }
}

/// A balance holder. `balance` is never negative in committed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: String,
    pub balance: BigDecimal,
    pub asset_type: String,
    pub kind: WalletKind,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: String, asset_type: String, kind: WalletKind, is_primary: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: BigDecimal::from(0),
            asset_type,
            kind,
            is_primary,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn covers(&self, amount: &BigDecimal) -> bool {
        &self.balance >= amount
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "balance": self.balance.to_string(),
            "asset_type": self.asset_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerEntryKind {
    Deposit,
    Withdrawal,
    TransferDebit,
    TransferCredit,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::Deposit => "deposit",
            LedgerEntryKind::Withdrawal => "withdrawal",
            LedgerEntryKind::TransferDebit => "transfer-debit",
            LedgerEntryKind::TransferCredit => "transfer-credit",
        }
    }
}

impl FromStr for LedgerEntryKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "deposit" => Ok(LedgerEntryKind::Deposit),
            "withdrawal" => Ok(LedgerEntryKind::Withdrawal),
            "transfer-debit" => Ok(LedgerEntryKind::TransferDebit),
            "transfer-credit" => Ok(LedgerEntryKind::TransferCredit),
            other => Err(format!("unknown ledger entry kind '{}'", other)),
        }
    }
}

/// Immutable record of a single balance movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: LedgerEntryKind,
    pub amount: BigDecimal,
    pub asset_type: String,
    pub counterparty_wallet_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        wallet_id: Uuid,
        kind: LedgerEntryKind,
        amount: BigDecimal,
        asset_type: String,
        counterparty_wallet_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            kind,
            amount,
            asset_type,
            counterparty_wallet_id,
            created_at: Utc::now(),
        }
    }
}
