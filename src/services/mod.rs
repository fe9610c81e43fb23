pub mod audit;
pub mod external_transition;
pub mod payments;
pub mod wallets;

pub use audit::AuditTrail;
pub use external_transition::{Preflight, ProcessorAcknowledged};
pub use payments::{CreatePayment, PaymentStateMachine};
pub use wallets::{Movement, OpenWallet, TransferReceipt, WalletLedger};
