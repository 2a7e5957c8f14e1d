//! Gateway redirect handling: signature verification and order reconciliation.

mod common;

use axum::http::Method;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{encode_query_value, location, TestApp};
use serde_json::json;
use storefront_api::entities::OrderStatus;

#[tokio::test]
async fn verified_complete_callback_marks_order_completed() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");
    let response = app.callback(&data).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/success.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Completed
    );
}

#[tokio::test]
async fn replayed_callback_is_idempotent() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;
    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");

    let first = app.callback(&data).await;
    assert_eq!(location(&first), "/success.html");
    let completed_at = app.order(order.id).await.updated_at;

    let second = app.callback(&data).await;
    assert_eq!(second.status(), 303);
    assert_eq!(location(&second), "/success.html");

    let after_replay = app.order(order.id).await;
    assert_eq!(after_replay.status, OrderStatus::Completed);
    assert_eq!(after_replay.updated_at, completed_at);
}

#[tokio::test]
async fn tampered_payload_is_rejected() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    // Signed for one amount, then the amount is edited in transit.
    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");
    let decoded = String::from_utf8(STANDARD.decode(&data).unwrap()).unwrap();
    let tampered = STANDARD.encode(decoded.replace("129.98", "1.00"));

    let response = app.callback(&tampered).await;
    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/failure.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Initiated
    );
}

#[tokio::test]
async fn payload_signed_with_another_secret_is_rejected() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    let payload = json!({
        "transaction_code": "000AWEO",
        "status": "COMPLETE",
        "total_amount": "129.98",
        "transaction_uuid": order.transaction_uuid,
        "product_code": "EPAYTEST",
        "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
        "signature": "dlVOZxces/2K+sMkgT1YGwSNDYK3BaO1Xd5uYCnHbGM=",
    });
    let response = app.callback(&STANDARD.encode(payload.to_string())).await;

    assert_eq!(location(&response), "/failure.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Initiated
    );
}

#[tokio::test]
async fn signed_but_incomplete_payment_is_rejected() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "PENDING");
    let response = app.callback(&data).await;

    assert_eq!(location(&response), "/failure.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Initiated
    );
}

#[tokio::test]
async fn gateway_failure_redirect_leaves_order_untouched() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    // Even a valid payload is ignored once the gateway reports failure.
    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");
    let uri = format!(
        "/esewa-callback?status=fail&data={}",
        encode_query_value(&data)
    );
    let response = app.get(&uri).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/failure.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Initiated
    );
}

#[tokio::test]
async fn missing_or_garbled_payload_redirects_to_failure() {
    let app = TestApp::new().await;

    for uri in [
        "/esewa-callback",
        "/esewa-callback?data=",
        "/esewa-callback?data=not*base64!",
        "/esewa-callback?data=bm90IGpzb24",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), 303, "{uri}");
        assert_eq!(location(&response), "/failure.html", "{uri}");
    }
}

#[tokio::test]
async fn verified_callback_for_unknown_transaction_redirects_to_failure() {
    let app = TestApp::new().await;
    let data = app.signed_callback_data("no-such-transaction", "10.00", "COMPLETE");

    let response = app.callback(&data).await;
    assert_eq!(location(&response), "/failure.html");
}

#[tokio::test]
async fn verified_callback_cannot_revive_failed_order() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    let failed = app
        .request(
            Method::POST,
            &format!("/api/admin/transactions/{}/fail", order.transaction_uuid),
            None,
        )
        .await;
    assert_eq!(failed.status(), 200);

    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");
    let response = app.callback(&data).await;

    assert_eq!(location(&response), "/failure.html");
    assert_eq!(
        app.order_by_transaction(&order.transaction_uuid).await.status,
        OrderStatus::Failed
    );
}

#[tokio::test]
async fn unescaped_plus_signs_still_verify() {
    let app = TestApp::new().await;
    let order = app.place_aviator_order().await;

    // Clients that leave '+' unescaped have it decoded to a space.
    let data = app.signed_callback_data(&order.transaction_uuid, "129.98", "COMPLETE");
    let uri = format!(
        "/esewa-callback?data={}",
        data.replace('/', "%2F").replace('=', "%3D")
    );
    let response = app.get(&uri).await;

    assert_eq!(response.status(), 303);
    assert_eq!(location(&response), "/success.html");
    assert_eq!(
        app.order(order.id).await.status,
        OrderStatus::Completed
    );
}
