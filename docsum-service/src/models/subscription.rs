use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local mirror of a billing-provider subscription, keyed by its provider id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: String,
    pub stripe_price_id: Option<String>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields applied by a webhook. `None` leaves the stored value untouched.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub stripe_subscription_id: String,
    pub user_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionUpsert {
    /// Merge onto an existing row, or build a new one when there is none.
    pub fn apply(self, existing: Option<Subscription>) -> Subscription {
        let now = Utc::now();
        match existing {
            Some(current) => Subscription {
                user_id: self.user_id.or(current.user_id),
                stripe_customer_id: self.stripe_customer_id.or(current.stripe_customer_id),
                stripe_price_id: self.stripe_price_id.or(current.stripe_price_id),
                status: self.status,
                current_period_end: self.current_period_end.or(current.current_period_end),
                updated_at: now,
                ..current
            },
            None => Subscription {
                id: Uuid::new_v4(),
                user_id: self.user_id,
                stripe_customer_id: self.stripe_customer_id,
                stripe_subscription_id: self.stripe_subscription_id,
                stripe_price_id: self.stripe_price_id,
                status: self.status,
                current_period_end: self.current_period_end,
                created_at: now,
                updated_at: now,
            },
        }
    }
}
