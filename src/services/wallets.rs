//! Wallet balances and the movements between them.
//!
//! Each movement locks the wallets it touches, checks the balance against the
//! locked value, and commits the balance change, its ledger entry and its
//! audit record together. Transfers lock both wallets in id order so two
//! opposite transfers cannot deadlock.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::assets::AssetAllowList;
use crate::domain::{
    actions, Actor, AuditRecord, EntityType, LedgerEntry, LedgerEntryKind, Wallet, WalletKind,
};
use crate::error::AppError;
use crate::ports::{Database, UnitOfWork};
use crate::services::AuditTrail;
use crate::validation::{validate_amount, validate_owner_id};

#[derive(Debug, Clone, Deserialize)]
pub struct OpenWallet {
    pub owner_id: String,
    pub asset_type: String,
    pub kind: WalletKind,
    #[serde(default)]
    pub is_primary: bool,
}

/// Result of a single-wallet deposit or withdrawal.
#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub wallet: Wallet,
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub from: Wallet,
    pub to: Wallet,
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

#[derive(Clone)]
pub struct WalletLedger {
    db: Arc<dyn Database>,
    audit: AuditTrail,
    assets: Arc<AssetAllowList>,
}

impl WalletLedger {
    pub fn new(db: Arc<dyn Database>, assets: Arc<AssetAllowList>) -> Self {
        Self {
            audit: AuditTrail::new(Arc::clone(&db)),
            db,
            assets,
        }
    }

    pub async fn open_wallet(&self, actor: &Actor, input: OpenWallet) -> Result<Wallet, AppError> {
        validate_owner_id(&input.owner_id)?;
        self.assets.check("asset_type", &input.asset_type)?;

        let wallet = Wallet::new(
            input.owner_id,
            input.asset_type,
            input.kind,
            input.is_primary,
        );

        let mut uow = self.db.begin().await?;
        uow.insert_wallet(&wallet).await?;
        self.audit
            .record(
                uow.as_mut(),
                &AuditRecord::new(
                    actions::WALLET_CREATED,
                    EntityType::Wallet,
                    wallet.id,
                    actor.id.clone(),
                )
                .after(wallet.snapshot())
                .metadata(json!({ "kind": wallet.kind.as_str(), "is_primary": wallet.is_primary })),
            )
            .await?;
        uow.commit().await?;

        tracing::info!(
            wallet_id = %wallet.id,
            owner_id = %wallet.owner_id,
            asset_type = %wallet.asset_type,
            "wallet opened"
        );
        Ok(wallet)
    }

    pub async fn get_wallet(&self, id: Uuid) -> Result<Wallet, AppError> {
        self.db
            .wallet(id)
            .await?
            .ok_or_else(|| wallet_not_found(id))
    }

    pub async fn ledger_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, AppError> {
        self.get_wallet(wallet_id).await?;
        Ok(self.db.ledger_entries(wallet_id).await?)
    }

    pub async fn deposit(
        &self,
        actor: &Actor,
        wallet_id: Uuid,
        amount: &BigDecimal,
        asset: &str,
    ) -> Result<Movement, AppError> {
        self.check_movement(amount, asset)?;

        let mut uow = self.db.begin().await?;
        let current = locked_wallet(uow.as_mut(), wallet_id).await?;
        check_asset(&current, asset)?;

        let mut updated = current.clone();
        updated.balance = &current.balance + amount;
        updated.updated_at = Utc::now();
        let entry = LedgerEntry::new(
            wallet_id,
            LedgerEntryKind::Deposit,
            amount.clone(),
            current.asset_type.clone(),
            None,
        );

        self.audit
            .record(
                uow.as_mut(),
                &movement_record(actions::WALLET_DEPOSIT, actor, &current, &updated, &entry),
            )
            .await?;
        uow.update_wallet_balance(wallet_id, &updated.balance, updated.updated_at)
            .await?;
        uow.insert_ledger_entry(&entry).await?;
        uow.commit().await?;

        tracing::info!(
            wallet_id = %wallet_id,
            actor_id = %actor.id,
            amount = %amount,
            balance = %updated.balance,
            "deposit applied"
        );
        Ok(Movement {
            wallet: updated,
            entry,
        })
    }

    pub async fn withdraw(
        &self,
        actor: &Actor,
        wallet_id: Uuid,
        amount: &BigDecimal,
        asset: &str,
    ) -> Result<Movement, AppError> {
        self.check_movement(amount, asset)?;

        let mut uow = self.db.begin().await?;
        let current = locked_wallet(uow.as_mut(), wallet_id).await?;
        check_asset(&current, asset)?;

        if !current.covers(amount) {
            release(uow).await;
            tracing::warn!(
                wallet_id = %wallet_id,
                actor_id = %actor.id,
                amount = %amount,
                balance = %current.balance,
                "withdrawal rejected: insufficient balance"
            );
            self.audit
                .record_detached(
                    AuditRecord::new(
                        actions::WALLET_WITHDRAW_REJECTED,
                        EntityType::Wallet,
                        wallet_id,
                        actor.id.clone(),
                    )
                    .before(current.snapshot())
                    .metadata(json!({ "amount": amount.to_string(), "reason": "insufficient_balance" })),
                )
                .await;
            return Err(AppError::InsufficientBalance { wallet_id });
        }

        let mut updated = current.clone();
        updated.balance = &current.balance - amount;
        updated.updated_at = Utc::now();
        let entry = LedgerEntry::new(
            wallet_id,
            LedgerEntryKind::Withdrawal,
            amount.clone(),
            current.asset_type.clone(),
            None,
        );

        self.audit
            .record(
                uow.as_mut(),
                &movement_record(actions::WALLET_WITHDRAW, actor, &current, &updated, &entry),
            )
            .await?;
        uow.update_wallet_balance(wallet_id, &updated.balance, updated.updated_at)
            .await?;
        uow.insert_ledger_entry(&entry).await?;
        uow.commit().await?;

        tracing::info!(
            wallet_id = %wallet_id,
            actor_id = %actor.id,
            amount = %amount,
            balance = %updated.balance,
            "withdrawal applied"
        );
        Ok(Movement {
            wallet: updated,
            entry,
        })
    }

    /// Moves `amount` between two wallets of the same asset in one unit of work.
    pub async fn transfer(
        &self,
        actor: &Actor,
        from_id: Uuid,
        to_id: Uuid,
        amount: &BigDecimal,
        asset: &str,
    ) -> Result<TransferReceipt, AppError> {
        if from_id == to_id {
            return Err(AppError::Validation(
                "cannot transfer a wallet to itself".to_string(),
            ));
        }
        self.check_movement(amount, asset)?;

        let mut uow = self.db.begin().await?;
        let (first, second) = if from_id < to_id {
            (from_id, to_id)
        } else {
            (to_id, from_id)
        };
        let first = locked_wallet(uow.as_mut(), first).await?;
        let second = locked_wallet(uow.as_mut(), second).await?;
        let (from, to) = if first.id == from_id {
            (first, second)
        } else {
            (second, first)
        };

        check_asset(&from, asset)?;
        check_asset(&to, asset)?;

        if !from.covers(amount) {
            release(uow).await;
            tracing::warn!(
                from_wallet_id = %from_id,
                to_wallet_id = %to_id,
                actor_id = %actor.id,
                amount = %amount,
                balance = %from.balance,
                "transfer rejected: insufficient balance"
            );
            self.audit
                .record_detached(
                    AuditRecord::new(
                        actions::WALLET_TRANSFER_REJECTED,
                        EntityType::Wallet,
                        from_id,
                        actor.id.clone(),
                    )
                    .before(from.snapshot())
                    .metadata(json!({
                        "amount": amount.to_string(),
                        "to_wallet_id": to_id,
                        "reason": "insufficient_balance",
                    })),
                )
                .await;
            return Err(AppError::InsufficientBalance { wallet_id: from_id });
        }

        let now = Utc::now();
        let mut debited = from.clone();
        debited.balance = &from.balance - amount;
        debited.updated_at = now;
        let mut credited = to.clone();
        credited.balance = &to.balance + amount;
        credited.updated_at = now;

        let debit = LedgerEntry::new(
            from_id,
            LedgerEntryKind::TransferDebit,
            amount.clone(),
            from.asset_type.clone(),
            Some(to_id),
        );
        let credit = LedgerEntry::new(
            to_id,
            LedgerEntryKind::TransferCredit,
            amount.clone(),
            to.asset_type.clone(),
            Some(from_id),
        );

        self.audit
            .record(
                uow.as_mut(),
                &movement_record(actions::WALLET_TRANSFER_DEBIT, actor, &from, &debited, &debit),
            )
            .await?;
        self.audit
            .record(
                uow.as_mut(),
                &movement_record(actions::WALLET_TRANSFER_CREDIT, actor, &to, &credited, &credit),
            )
            .await?;
        uow.update_wallet_balance(from_id, &debited.balance, now)
            .await?;
        uow.update_wallet_balance(to_id, &credited.balance, now)
            .await?;
        uow.insert_ledger_entry(&debit).await?;
        uow.insert_ledger_entry(&credit).await?;
        uow.commit().await?;

        tracing::info!(
            from_wallet_id = %from_id,
            to_wallet_id = %to_id,
            actor_id = %actor.id,
            amount = %amount,
            "transfer applied"
        );
        Ok(TransferReceipt {
            from: debited,
            to: credited,
            debit,
            credit,
        })
    }

    fn check_movement(&self, amount: &BigDecimal, asset: &str) -> Result<(), AppError> {
        validate_amount(amount)?;
        self.assets.check("asset_type", asset)?;
        Ok(())
    }
}

async fn locked_wallet(uow: &mut dyn UnitOfWork, id: Uuid) -> Result<Wallet, AppError> {
    uow.wallet_for_update(id)
        .await?
        .ok_or_else(|| wallet_not_found(id))
}

async fn release(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

fn check_asset(wallet: &Wallet, asset: &str) -> Result<(), AppError> {
    if wallet.asset_type != asset {
        return Err(AppError::Validation(format!(
            "wallet {} holds {}, not {}",
            wallet.id, wallet.asset_type, asset
        )));
    }
    Ok(())
}

fn wallet_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("wallet {} not found", id))
}

fn movement_record(
    action: &str,
    actor: &Actor,
    before: &Wallet,
    after: &Wallet,
    entry: &LedgerEntry,
) -> AuditRecord {
    AuditRecord::new(action, EntityType::Wallet, before.id, actor.id.clone())
        .before(before.snapshot())
        .after(after.snapshot())
        .metadata(json!({
            "amount": entry.amount.to_string(),
            "ledger_entry_id": entry.id,
            "counterparty_wallet_id": entry.counterparty_wallet_id,
        }))
}
