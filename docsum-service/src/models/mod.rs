pub mod document;
pub mod subscription;
pub mod summary;

pub use document::{Document, DocumentWithSummaries, NewDocument};
pub use subscription::{Subscription, SubscriptionUpsert};
pub use summary::Summary;
