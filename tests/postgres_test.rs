use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;

use treasury_core::adapters::PgDatabase;
use treasury_core::config::assets::AssetAllowList;
use treasury_core::db;
use treasury_core::domain::{Actor, EntityType, PaymentStatus, WalletKind};
use treasury_core::error::AppError;
use treasury_core::services::{AuditTrail, CreatePayment, OpenWallet, PaymentStateMachine, WalletLedger};

async fn database() -> Option<Arc<PgDatabase>> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("Skipping Postgres test: DATABASE_URL not set");
            return None;
        }
    };

    let pool = db::create_pool(&database_url)
        .await
        .expect("Failed to connect to Postgres");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    Some(Arc::new(PgDatabase::new(pool)))
}

fn assets() -> Arc<AssetAllowList> {
    Arc::new(AssetAllowList::new(["USD"]))
}

#[tokio::test]
async fn test_payment_lifecycle_on_postgres() {
    let Some(db) = database().await else { return };
    let engine = PaymentStateMachine::new(db.clone(), assets());
    let actor = Actor::user(format!("pg-{}", uuid::Uuid::new_v4()));

    let payment = engine
        .create_payment(
            &actor,
            CreatePayment {
                amount: BigDecimal::from_str("10.50").unwrap(),
                currency: "USD".to_string(),
                idempotency_key: "K1".to_string(),
                external_reference: None,
            },
        )
        .await
        .unwrap();

    let confirmed = engine.confirm(&actor, payment.id).await.unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert!(matches!(
        engine.confirm(&actor, payment.id).await,
        Err(AppError::InvalidTransition { .. })
    ));

    let stored = engine.get_payment(payment.id).await.unwrap();
    assert_eq!(stored.amount, BigDecimal::from_str("10.50").unwrap());

    let duplicate = engine
        .create_payment(
            &actor,
            CreatePayment {
                amount: BigDecimal::from(1),
                currency: "USD".to_string(),
                idempotency_key: "K1".to_string(),
                external_reference: None,
            },
        )
        .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateIdempotencyKey(_))));

    let history = AuditTrail::new(db)
        .history(EntityType::Payment, payment.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_concurrent_withdrawals_on_postgres() {
    let Some(db) = database().await else { return };
    let ledger = WalletLedger::new(db, assets());
    let actor = Actor::system();

    let wallet = ledger
        .open_wallet(
            &actor,
            OpenWallet {
                owner_id: "pg-owner".to_string(),
                asset_type: "USD".to_string(),
                kind: WalletKind::Fiat,
                is_primary: false,
            },
        )
        .await
        .unwrap();
    ledger
        .deposit(&actor, wallet.id, &BigDecimal::from(100), "USD")
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            let wallet_id = wallet.id;
            tokio::spawn(async move {
                ledger
                    .withdraw(&Actor::system(), wallet_id, &BigDecimal::from(80), "USD")
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(
        ledger.get_wallet(wallet.id).await.unwrap().balance,
        BigDecimal::from(20)
    );
}
