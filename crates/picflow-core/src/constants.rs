//! Pipeline-wide constants.

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 400;

/// JPEG quality used for thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// JPEG quality used when re-encoding the orientation-corrected original.
pub const NORMALIZED_JPEG_QUALITY: u8 = 95;

/// Longest edge of the copy sent to the vision provider, in pixels.
pub const VISION_MAX_EDGE: u32 = 1024;

/// JPEG quality of the copy sent to the vision provider.
pub const VISION_JPEG_QUALITY: u8 = 85;

/// Tag emitted when the upload carried any GPS data at all.
pub const HAS_LOCATION_TAG: &str = "有定位";

/// Tag names longer than this (in characters) are rejected.
pub const MAX_TAG_NAME_CHARS: usize = 64;

/// Storage key prefix for normalized originals.
pub const ORIGINALS_PREFIX: &str = "originals";

/// Storage key prefix for thumbnails.
pub const THUMBNAILS_PREFIX: &str = "thumbnails";
