mod common;

use chrono::Utc;
use common::{
    session_token, sign_webhook, TestApp, TestOptions, TEST_APP_URL, TEST_USER_ID,
};
use docsum_service::models::SubscriptionUpsert;
use docsum_service::services::DocumentRepository;
use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn subscription_object(id: &str, status: &str, user_id: Option<&str>) -> serde_json::Value {
    let metadata = match user_id {
        Some(uid) => json!({ "userId": uid }),
        None => json!({}),
    };
    json!({
        "id": id,
        "object": "subscription",
        "customer": "cus_123",
        "status": status,
        "current_period_end": 1_900_000_000,
        "items": { "data": [ { "price": { "id": "price_pro" } } ] },
        "metadata": metadata
    })
}

fn event(id: &str, event_type: &str, object: serde_json::Value) -> String {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "data": { "object": object }
    })
    .to_string()
}

#[tokio::test]
async fn webhook_requires_configuration() {
    let app = TestApp::spawn_with(TestOptions {
        stripe_configured: false,
        ..TestOptions::default()
    })
    .await;
    let body = event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "active", None));

    let response = app.post_signed_webhook(&body).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_rejects_bad_signatures() {
    let app = TestApp::spawn().await;
    let body = event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "active", None));

    let missing = app.post_webhook(&body, None).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let forged = app
        .post_webhook(&body, Some(&format!("t={},v1=deadbeef", Utc::now().timestamp())))
        .await;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);

    let stale = app
        .post_webhook(&body, Some(&sign_webhook(&body, Utc::now().timestamp() - 3600)))
        .await;
    assert_eq!(stale.status(), StatusCode::BAD_REQUEST);

    let other_body = event("evt_2", "customer.subscription.updated", subscription_object("sub_1", "canceled", None));
    let swapped = app
        .post_webhook(&other_body, Some(&sign_webhook(&body, Utc::now().timestamp())))
        .await;
    assert_eq!(swapped.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.repo.subscription_count().await, 0);
}

#[tokio::test]
async fn subscription_update_creates_then_updates_single_row() {
    let app = TestApp::spawn().await;

    let created = event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "active", Some(TEST_USER_ID)));
    let response = app.post_signed_webhook(&created).await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack: serde_json::Value = response.json().await.unwrap();
    assert_eq!(ack["received"], true);

    let stored = app.repo.subscription("sub_1").await.expect("Subscription not stored");
    assert_eq!(stored.status, "active");
    assert_eq!(stored.user_id.as_deref(), Some(TEST_USER_ID));
    assert_eq!(stored.stripe_price_id.as_deref(), Some("price_pro"));

    let canceled = event("evt_2", "customer.subscription.deleted", subscription_object("sub_1", "canceled", None));
    assert_eq!(app.post_signed_webhook(&canceled).await.status(), StatusCode::OK);

    assert_eq!(app.repo.subscription_count().await, 1);
    let updated = app.repo.subscription("sub_1").await.unwrap();
    assert_eq!(updated.id, stored.id);
    assert_eq!(updated.status, "canceled");
    assert_eq!(updated.user_id.as_deref(), Some(TEST_USER_ID));
}

#[tokio::test]
async fn replayed_event_is_acknowledged_without_changes() {
    let app = TestApp::spawn().await;

    let original = event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "active", None));
    assert_eq!(app.post_signed_webhook(&original).await.status(), StatusCode::OK);

    // Same event id, different payload: must not be applied.
    let replay = event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "canceled", None));
    let response = app.post_signed_webhook(&replay).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.repo.subscription_count().await, 1);
    assert_eq!(app.repo.subscription("sub_1").await.unwrap().status, "active");
}

#[tokio::test]
async fn concurrent_deliveries_of_one_event_apply_once() {
    let app = TestApp::spawn().await;

    // Both deliveries pass the processed check before either records the id.
    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_race"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(subscription_object("sub_race", "active", None))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .mount(&app.upstream)
        .await;

    let body = event(
        "evt_race",
        "invoice.payment_succeeded",
        json!({ "id": "in_race", "object": "invoice", "subscription": "sub_race" }),
    );

    let (first, second) = tokio::join!(
        app.post_signed_webhook(&body),
        app.post_signed_webhook(&body)
    );

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(app.repo.subscription_count().await, 1);
    assert_eq!(app.repo.subscription("sub_race").await.unwrap().status, "active");

    let replay = app.post_signed_webhook(&body).await;
    assert_eq!(replay.status(), StatusCode::OK);
    assert_eq!(app.repo.subscription_count().await, 1);
}

#[tokio::test]
async fn checkout_completed_links_subscription_to_user() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_new"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscription_object("sub_new", "active", None)))
        .expect(1)
        .mount(&app.upstream)
        .await;

    let body = event(
        "evt_checkout",
        "checkout.session.completed",
        json!({
            "id": "cs_1",
            "object": "checkout.session",
            "customer": "cus_123",
            "subscription": "sub_new",
            "metadata": { "userId": TEST_USER_ID }
        }),
    );

    assert_eq!(app.post_signed_webhook(&body).await.status(), StatusCode::OK);

    let token = session_token(TEST_USER_ID);
    let response = app.get("/api/subscription", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let subscription: serde_json::Value = response.json().await.unwrap();
    assert_eq!(subscription["stripe_subscription_id"], "sub_new");
    assert_eq!(subscription["stripe_customer_id"], "cus_123");
    assert_eq!(subscription["status"], "active");
}

#[tokio::test]
async fn invoice_payment_refreshes_subscription() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscription_object("sub_1", "active", Some(TEST_USER_ID))))
        .mount(&app.upstream)
        .await;

    let body = event(
        "evt_invoice",
        "invoice.payment_succeeded",
        json!({ "id": "in_1", "object": "invoice", "subscription": "sub_1" }),
    );

    assert_eq!(app.post_signed_webhook(&body).await.status(), StatusCode::OK);
    let stored = app.repo.subscription("sub_1").await.unwrap();
    assert_eq!(stored.current_period_end.unwrap().timestamp(), 1_900_000_000);
}

#[tokio::test]
async fn failed_apply_can_be_retried() {
    let app = TestApp::spawn().await;

    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "type": "api_error", "message": "try again" }
        })))
        .up_to_n_times(1)
        .mount(&app.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(subscription_object("sub_1", "active", None)))
        .mount(&app.upstream)
        .await;

    let body = event(
        "evt_retry",
        "invoice.payment_succeeded",
        json!({ "id": "in_1", "subscription": "sub_1" }),
    );

    assert_eq!(app.post_signed_webhook(&body).await.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(app.repo.subscription_count().await, 0);

    assert_eq!(app.post_signed_webhook(&body).await.status(), StatusCode::OK);
    assert_eq!(app.repo.subscription_count().await, 1);
}

#[tokio::test]
async fn unhandled_events_are_acknowledged() {
    let app = TestApp::spawn().await;
    let body = event("evt_other", "customer.created", json!({ "id": "cus_1" }));

    let response = app.post_signed_webhook(&body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.repo.subscription_count().await, 0);
}

#[tokio::test]
async fn create_checkout_returns_session_url() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("mode=subscription"))
        .and(body_string_contains("line_items%5B0%5D%5Bprice%5D=price_pro"))
        .and(body_string_contains("metadata%5BuserId%5D=user_alice"))
        .and(body_string_contains("subscription_data%5Bmetadata%5D%5BuserId%5D=user_alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.test/c/cs_test_1",
            "metadata": { "userId": TEST_USER_ID }
        })))
        .expect(1)
        .mount(&app.upstream)
        .await;

    let token = session_token(TEST_USER_ID);
    let response = app
        .post_json("/api/stripe/create-checkout", Some(&token), &json!({ "priceId": "price_pro" }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["url"], "https://checkout.stripe.test/c/cs_test_1");

    let requests = app.upstream.received_requests().await.unwrap();
    let form = String::from_utf8(requests[0].body.clone()).unwrap();
    let success_url = format!("success_url={}", urlencode(&format!("{}/dashboard?success=true", TEST_APP_URL)));
    assert!(form.contains(&success_url), "{}", form);
}

fn urlencode(value: &str) -> String {
    value
        .replace(':', "%3A")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('=', "%3D")
}

#[tokio::test]
async fn create_checkout_requires_price_id() {
    let app = TestApp::spawn().await;
    let token = session_token(TEST_USER_ID);

    let response = app
        .post_json("/api/stripe/create-checkout", Some(&token), &json!({ "priceId": "" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json("/api/stripe/create-checkout", Some(&token), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_checkout_unavailable_without_stripe() {
    let app = TestApp::spawn_with(TestOptions {
        stripe_configured: false,
        ..TestOptions::default()
    })
    .await;
    let token = session_token(TEST_USER_ID);

    let response = app
        .post_json("/api/stripe/create-checkout", Some(&token), &json!({ "priceId": "price_pro" }))
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn billing_portal_requires_existing_customer() {
    let app = TestApp::spawn().await;
    let token = session_token(TEST_USER_ID);

    let response = app
        .post_json("/api/stripe/billing-portal", Some(&token), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.repo
        .upsert_subscription(SubscriptionUpsert {
            stripe_subscription_id: "sub_1".to_string(),
            user_id: Some(TEST_USER_ID.to_string()),
            stripe_customer_id: Some("cus_123".to_string()),
            stripe_price_id: None,
            status: "active".to_string(),
            current_period_end: None,
        })
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/billing_portal/sessions"))
        .and(body_string_contains("customer=cus_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "bps_1",
            "url": "https://billing.stripe.test/p/session"
        })))
        .expect(1)
        .mount(&app.upstream)
        .await;

    let response = app
        .post_json("/api/stripe/billing-portal", Some(&token), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["url"], "https://billing.stripe.test/p/session");
}

#[tokio::test]
async fn subscription_is_not_found_before_checkout() {
    let app = TestApp::spawn().await;
    let token = session_token(TEST_USER_ID);

    let response = app.get("/api/subscription", Some(&token)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
