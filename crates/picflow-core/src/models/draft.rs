use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::geo::GeoPoint;

/// Bytes handed to the ingestion pipeline by the upload handler.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub owner_id: Uuid,
}

impl RawUpload {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            owner_id,
        }
    }

    /// Lower-cased extension of the declared filename, restricted to ASCII
    /// alphanumerics so it can be embedded in a storage key.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.filename.rsplit_once('.')?;
        let ext = ext.trim().to_ascii_lowercase();
        if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext)
    }
}

/// Pixel dimensions of a stored image. `0x0` marks "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const UNSET: Resolution = Resolution {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    /// Parses the `"<width>x<height>"` form; anything else is unset.
    pub fn parse(s: &str) -> Self {
        s.split_once('x')
            .and_then(|(w, h)| Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?)))
            .unwrap_or(Self::UNSET)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output of the ingestion pipeline, consumed once by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionDraft {
    pub filename: String,
    pub file_key: String,
    pub thumbnail_key: String,
    pub resolution: Resolution,
    pub capture_time: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub coordinates: Option<GeoPoint>,
    /// Ordered, de-duplicated auto-generated tag names.
    pub auto_tags: Vec<String>,
}

impl IngestionDraft {
    /// Whether image normalization failed and the raw upload is served as-is.
    pub fn is_passthrough(&self) -> bool {
        self.file_key == self.thumbnail_key && self.resolution.is_unset()
    }
}
