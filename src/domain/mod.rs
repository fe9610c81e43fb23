//! Framework-agnostic domain entities for the transaction safety core.

pub mod actor;
pub mod audit;
pub mod payment;
pub mod wallet;

pub use actor::Actor;
pub use audit::{actions, AuditRecord, EntityType};
pub use payment::{Payment, PaymentStatus};
pub use wallet::{LedgerEntry, LedgerEntryKind, Wallet, WalletKind};
