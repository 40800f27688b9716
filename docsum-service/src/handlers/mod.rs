pub mod billing;
pub mod documents;
pub mod extract;
pub mod health;
pub mod summarize;

pub use billing::{billing_portal, create_checkout, get_subscription, stripe_webhook};
pub use documents::{get_document, list_documents};
pub use extract::extract_text;
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use summarize::summarize;
