//! Database repositories for data access layer
//
// Persistence seam shared by every consumer
pub mod store;
//
// PostgreSQL implementation and pool setup
pub mod asset;
pub mod setup;
//
// In-process implementation for tests and dry runs
pub mod memory;
//
// Keyword parsing shared by both implementations
pub mod search;

pub use asset::PgAssetStore;
pub use memory::MemoryAssetStore;
pub use search::{normalize_date_keyword, SearchKeyword};
pub use setup::{connect, run_migrations};
pub use store::AssetStore;
