pub mod database;
pub mod extractor;
pub mod memory;
pub mod metrics;
pub mod providers;
pub mod session;
pub mod stripe;

pub use database::{create_pool, run_migrations, DocumentRepository, PgRepository};
pub use extractor::{ExtractError, ExtractorRegistry};
pub use memory::InMemoryRepository;
pub use metrics::{get_metrics, init_metrics};
pub use providers::{MockProvider, OpenAiProvider, SummaryProvider};
pub use session::SessionVerifier;
pub use stripe::StripeClient;
