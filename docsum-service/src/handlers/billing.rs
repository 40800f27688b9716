//! Subscription checkout, billing portal and Stripe webhooks.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CheckoutRequest, UrlResponse, WebhookAck},
    middleware::AuthUser,
    models::Subscription,
    services::{
        metrics,
        stripe::{CheckoutSession, Invoice, StripeSubscription, WebhookEvent, USER_ID_METADATA_KEY},
    },
    AppState,
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

fn billing_unavailable() -> AppError {
    AppError::ServiceUnavailable("Billing is not configured".to_string())
}

pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<UrlResponse>, AppError> {
    if !state.stripe.is_configured() {
        return Err(billing_unavailable());
    }

    let Json(request) =
        payload.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    request.validate()?;

    let app_url = state.config.app_url.trim_end_matches('/');
    let session = state
        .stripe
        .create_checkout_session(
            &request.price_id,
            &user.user_id,
            &format!("{}/dashboard?success=true", app_url),
            &format!("{}/pricing?canceled=true", app_url),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create checkout session");
            AppError::BadGateway(format!("Failed to create checkout session: {}", e))
        })?;

    let url = session.url.ok_or_else(|| {
        AppError::BadGateway("Checkout session has no redirect URL".to_string())
    })?;

    Ok(Json(UrlResponse { url }))
}

pub async fn billing_portal(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UrlResponse>, AppError> {
    if !state.stripe.is_configured() {
        return Err(billing_unavailable());
    }

    let customer_id = state
        .repo
        .get_subscription_for_user(&user.user_id)
        .await?
        .and_then(|s| s.stripe_customer_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No subscription found")))?;

    let return_url = format!(
        "{}/dashboard/settings",
        state.config.app_url.trim_end_matches('/')
    );
    let session = state
        .stripe
        .create_billing_portal_session(&customer_id, &return_url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create billing portal session");
            AppError::BadGateway(format!("Failed to create billing portal session: {}", e))
        })?;

    Ok(Json(UrlResponse { url: session.url }))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Subscription>, AppError> {
    state
        .repo
        .get_subscription_for_user(&user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No subscription found")))
}

/// Verify, de-duplicate and apply a Stripe event.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, AppError> {
    if !state.stripe.webhook_configured() {
        return Err(billing_unavailable());
    }

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing Stripe-Signature header");
            AppError::BadRequest(anyhow::anyhow!("Missing webhook signature"))
        })?;

    state
        .stripe
        .verify_webhook_signature(&body, signature, Utc::now().timestamp())
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid webhook signature");
            AppError::BadRequest(anyhow::anyhow!("Invalid webhook signature"))
        })?;

    let event = state.stripe.parse_webhook_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    if state.repo.is_event_processed(&event.id).await? {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook ignored");
        metrics::record_webhook_event(&event.event_type, "duplicate");
        return Ok(Json(WebhookAck { received: true }));
    }

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing Stripe webhook");

    let outcome = apply_event(&state, &event).await.map_err(|e| {
        metrics::record_webhook_event(&event.event_type, "failed");
        tracing::error!(event_id = %event.id, error = %e, "Failed to apply webhook event");
        e
    })?;

    // Applying is idempotent; a concurrent delivery may have recorded the id first.
    let newly_recorded = state
        .repo
        .mark_event_processed(&event.id, &event.event_type)
        .await?;
    if !newly_recorded {
        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook event was recorded by a concurrent delivery"
        );
    }
    metrics::record_webhook_event(
        &event.event_type,
        if newly_recorded { outcome } else { "duplicate" },
    );

    Ok(Json(WebhookAck { received: true }))
}

fn decode_object<T: serde::de::DeserializeOwned>(event: &WebhookEvent) -> Result<T, AppError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!(
            "Invalid {} payload: {}",
            event.event_type,
            e
        ))
    })
}

async fn fetch_subscription(
    state: &AppState,
    subscription_id: &str,
) -> Result<StripeSubscription, AppError> {
    state
        .stripe
        .retrieve_subscription(subscription_id)
        .await
        .map_err(|e| AppError::BadGateway(format!("Failed to retrieve subscription: {}", e)))
}

/// Returns the outcome label recorded in metrics.
async fn apply_event(state: &AppState, event: &WebhookEvent) -> Result<&'static str, AppError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSession = decode_object(event)?;
            let Some(user_id) = session.metadata.get(USER_ID_METADATA_KEY).cloned() else {
                tracing::warn!(session_id = %session.id, "Checkout session has no userId metadata");
                return Ok("ignored");
            };
            let Some(subscription_id) = session.subscription.as_deref() else {
                tracing::warn!(session_id = %session.id, "Checkout session has no subscription");
                return Ok("ignored");
            };

            let subscription = fetch_subscription(state, subscription_id).await?;
            let mut upsert = subscription.to_upsert(Some(user_id));
            upsert.stripe_customer_id = upsert.stripe_customer_id.or(session.customer);

            let saved = state.repo.upsert_subscription(upsert).await?;
            tracing::info!(
                subscription_id = %saved.stripe_subscription_id,
                user_id = ?saved.user_id,
                status = %saved.status,
                "Subscription activated from checkout"
            );
            Ok("applied")
        }
        "invoice.payment_succeeded" => {
            let invoice: Invoice = decode_object(event)?;
            let Some(subscription_id) = invoice.subscription.as_deref() else {
                tracing::debug!(invoice_id = %invoice.id, "Invoice not tied to a subscription");
                return Ok("ignored");
            };

            let subscription = fetch_subscription(state, subscription_id).await?;
            let saved = state
                .repo
                .upsert_subscription(subscription.to_upsert(None))
                .await?;
            tracing::info!(
                subscription_id = %saved.stripe_subscription_id,
                status = %saved.status,
                "Subscription renewed"
            );
            Ok("applied")
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let subscription: StripeSubscription = decode_object(event)?;
            let saved = state
                .repo
                .upsert_subscription(subscription.to_upsert(None))
                .await?;
            tracing::info!(
                subscription_id = %saved.stripe_subscription_id,
                status = %saved.status,
                "Subscription updated"
            );
            Ok("applied")
        }
        other => {
            tracing::info!(event_type = %other, "Unhandled webhook event type");
            Ok("ignored")
        }
    }
}
