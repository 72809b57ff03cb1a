//! Image processing module
//!
//! - Orientation correction (orientation)
//! - Re-encoding of the corrected original and its thumbnail (normalizer)

pub mod normalizer;
pub mod orientation;

pub use normalizer::{encode_bounded_jpeg, normalize, NormalizeError, NormalizedImage, OutputFormat};
pub use orientation::ImageOrientation;
