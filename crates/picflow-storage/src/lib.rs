//! Picflow Storage Library
//!
//! Key-addressed blob storage for uploaded photos and their derivatives.
//!
//! # Storage key format
//!
//! - **Raw uploads**: `raw/{owner_id}/{uuid}.{ext}`
//! - **Normalized originals**: `originals/{owner_id}/{uuid}.{jpg|png}`
//! - **Thumbnails**: `thumbnails/{owner_id}/{uuid}.jpg`
//!
//! Keys must not contain `..` or a leading `/`. Key generation lives in the
//! `keys` module so callers never format keys by hand.

pub mod keys;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use keys::{derived_key, raw_key};
pub use local::LocalStorage;
pub use traits::{Storage, StorageError, StorageResult};
