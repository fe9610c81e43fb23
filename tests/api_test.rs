mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{body_json, get, post_json, test_config, TestApp};

#[tokio::test]
async fn payment_lifecycle_over_http() {
    let app = TestApp::new(test_config());

    let created = app
        .send(post_json(
            "/payments",
            "user-1",
            Some("K1"),
            json!({ "amount": "10.50", "currency": "USD" }),
        ))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["status"], "INITIATED");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let confirmed = app
        .send(post_json(&format!("/payments/{}/confirm", id), "user-1", Some("C1"), json!({})))
        .await;
    assert_eq!(confirmed.status(), StatusCode::OK);
    let confirmed = body_json(confirmed).await;
    assert_eq!(confirmed["data"]["status"], "CONFIRMED");
    assert_eq!(confirmed["data"]["amount"], created["data"]["amount"]);

    let again = app
        .send(post_json(&format!("/payments/{}/confirm", id), "user-1", Some("C2"), json!({})))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let again = body_json(again).await;
    assert_eq!(again["success"], false);
    assert_eq!(again["error"]["code"], "INVALID_TRANSITION");

    let fetched = body_json(app.send(get(&format!("/payments/{}", id), "user-1")).await).await;
    assert_eq!(fetched["data"]["status"], "CONFIRMED");

    let history = body_json(app.send(get(&format!("/payments/{}/audit", id), "user-1")).await).await;
    let recorded: Vec<_> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        recorded,
        vec![
            "payment.transition_rejected",
            "payment.transition",
            "payment.created"
        ]
    );
}

#[tokio::test]
async fn wallet_flow_over_http() {
    let app = TestApp::new(test_config());

    let mut wallets = Vec::new();
    for key in ["W1", "W2"] {
        let opened = app
            .send(post_json(
                "/wallets",
                "user-1",
                Some(key),
                json!({ "owner_id": "user-1", "asset_type": "USD", "kind": "fiat" }),
            ))
            .await;
        assert_eq!(opened.status(), StatusCode::CREATED);
        let opened = body_json(opened).await;
        wallets.push(opened["data"]["id"].as_str().unwrap().to_string());
    }
    let (a, b) = (&wallets[0], &wallets[1]);

    let deposit = app
        .send(post_json(
            &format!("/wallets/{}/deposit", a),
            "user-1",
            Some("D1"),
            json!({ "amount": "10", "asset_type": "USD" }),
        ))
        .await;
    assert_eq!(deposit.status(), StatusCode::OK);

    let overdraw = app
        .send(post_json(
            &format!("/wallets/{}/withdraw", a),
            "user-1",
            Some("WD1"),
            json!({ "amount": "100", "asset_type": "USD" }),
        ))
        .await;
    assert_eq!(overdraw.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(overdraw).await["error"]["code"], "INSUFFICIENT_BALANCE");

    let transfer = app
        .send(post_json(
            "/transfers",
            "user-1",
            Some("T1"),
            json!({
                "from_wallet_id": a,
                "to_wallet_id": b,
                "amount": "4",
                "asset_type": "USD",
            }),
        ))
        .await;
    assert_eq!(transfer.status(), StatusCode::OK);

    let wallet_a = body_json(app.send(get(&format!("/wallets/{}", a), "user-1")).await).await;
    let wallet_b = body_json(app.send(get(&format!("/wallets/{}", b), "user-1")).await).await;
    assert_eq!(wallet_a["data"]["balance"], "6");
    assert_eq!(wallet_b["data"]["balance"], "4");

    let ledger = body_json(app.send(get(&format!("/wallets/{}/ledger", a), "user-1")).await).await;
    assert_eq!(ledger["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn anonymous_callers_are_keyed_by_forwarded_ip() {
    let app = TestApp::new(test_config());

    let request = Request::builder()
        .method("POST")
        .uri("/payments")
        .header("content-type", "application/json")
        .header("idempotency-key", "anon-1")
        .header("x-forwarded-for", "203.0.113.50, 10.0.0.2")
        .body(Body::from(json!({ "amount": "3", "currency": "EUR" }).to_string()))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["owner_id"], "anon:203.0.113.50");
}

#[tokio::test]
async fn unsupported_currency_is_a_validation_error() {
    let app = TestApp::new(test_config());

    let response = app
        .send(post_json(
            "/payments",
            "user-1",
            Some("K-jpy"),
            json!({ "amount": "3", "currency": "JPY" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn reads_do_not_need_an_idempotency_key() {
    let app = TestApp::new(test_config());

    let response = app
        .send(get("/payments/6f1c1f57-4d5f-4b43-9a53-1f3a1b1b7a10", "user-1"))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new(test_config());

    let response = app.send(get("/health", "user-1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn malformed_amount_gets_the_failure_envelope() {
    let app = TestApp::new(test_config());
    let request = || {
        post_json(
            "/payments",
            "user-1",
            Some("K-abc"),
            json!({ "amount": "abc", "currency": "USD" }),
        )
    };

    let first = app.send(request()).await;
    assert_eq!(first.status(), StatusCode::BAD_REQUEST);
    let first = body_json(first).await;
    assert_eq!(first["success"], false);
    assert_eq!(first["error"]["code"], "VALIDATION_ERROR");

    let replayed = app.send(request()).await;
    assert_eq!(replayed.headers()["idempotent-replayed"], "true");
    assert_eq!(body_json(replayed).await, first);
}

#[tokio::test]
async fn non_uuid_ids_are_validation_errors() {
    let app = TestApp::new(test_config());

    let read = app.send(get("/payments/not-a-uuid", "user-1")).await;
    assert_eq!(read.status(), StatusCode::BAD_REQUEST);
    let read = body_json(read).await;
    assert_eq!(read["success"], false);
    assert_eq!(read["error"]["code"], "VALIDATION_ERROR");

    let deposit = app
        .send(post_json(
            "/wallets/12345/deposit",
            "user-1",
            Some("D-bad-id"),
            json!({ "amount": "1", "asset_type": "USD" }),
        ))
        .await;
    assert_eq!(deposit.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(deposit).await["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_confirm_body_does_not_confirm() {
    let app = TestApp::new(test_config());
    let created = body_json(
        app.send(post_json(
            "/payments",
            "user-1",
            Some("K-cb"),
            json!({ "amount": "5", "currency": "USD" }),
        ))
        .await,
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .send(post_json(
            &format!("/payments/{}/confirm", id),
            "user-1",
            Some("C-cb"),
            json!({ "transaction_reference": 42 }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

    let fetched = body_json(app.send(get(&format!("/payments/{}", id), "user-1")).await).await;
    assert_eq!(fetched["data"]["status"], "INITIATED");
}

#[tokio::test]
async fn reloaded_asset_list_applies_to_running_router() {
    let app = TestApp::new(test_config());
    let jpy = |key: &str| {
        post_json(
            "/payments",
            "user-1",
            Some(key),
            json!({ "amount": "300", "currency": "JPY" }),
        )
    };

    assert_eq!(app.send(jpy("J1")).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.state.assets.reload(["USD", "JPY"]), Ok(true));
    assert_eq!(app.send(jpy("J2")).await.status(), StatusCode::CREATED);

    let eur = app
        .send(post_json(
            "/payments",
            "user-1",
            Some("E1"),
            json!({ "amount": "3", "currency": "EUR" }),
        ))
        .await;
    assert_eq!(eur.status(), StatusCode::BAD_REQUEST);
}
