//! Picflow Processing Library
//!
//! Pure, synchronous photo processing: EXIF extraction, GPS conversion, orientation
//! correction, re-encoding and auto-tag synthesis. Nothing in this crate performs I/O
//! beyond reading the byte buffers it is given; async callers run the CPU-heavy parts
//! through `tokio::task::spawn_blocking`.

pub mod gps;
pub mod image;
pub mod metadata;
pub mod tagging;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export commonly used types
pub use gps::{GpsBlock, GpsComponent};
pub use self::image::{
    encode_bounded_jpeg, normalize, ImageOrientation, NormalizeError, NormalizedImage,
    OutputFormat,
};
pub use metadata::ExifMetadata;
pub use tagging::{synthesize_tags, TagList};
