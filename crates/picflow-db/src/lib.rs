//! Picflow persistence layer
//!
//! The `AssetStore` trait is the only thing the ingestion pipeline, the enrichment
//! job and the CLI depend on. `PgAssetStore` is the PostgreSQL implementation;
//! `MemoryAssetStore` backs tests and database-less dry runs.

pub mod db;

pub use db::{
    connect, normalize_date_keyword, run_migrations, AssetStore, MemoryAssetStore,
    PgAssetStore, SearchKeyword,
};
