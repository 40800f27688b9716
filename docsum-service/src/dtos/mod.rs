pub mod billing;
pub mod documents;
pub mod summarize;

pub use billing::{CheckoutRequest, UrlResponse, WebhookAck};
pub use documents::{DocumentResponse, ExtractTextResponse};
pub use summarize::{SummarizeRequest, SummaryDoneEvent};
