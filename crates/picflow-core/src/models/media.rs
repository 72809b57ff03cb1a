use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::draft::Resolution;
use super::geo::GeoPoint;

/// Where a tag association came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "tag_source", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Manual,
    Auto,
    Ai,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Manual => "manual",
            TagSource::Auto => "auto",
            TagSource::Ai => "ai",
        }
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TagSource::Manual),
            "auto" => Ok(TagSource::Auto),
            "ai" => Ok(TagSource::Ai),
            other => Err(format!("unknown tag source: {other}")),
        }
    }
}

/// A globally unique tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// A tag as seen from one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTag {
    pub name: String,
    pub source: TagSource,
}

/// A committed photo record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub file_key: String,
    pub thumbnail_key: String,
    pub resolution: Resolution,
    pub capture_time: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub coordinates: Option<GeoPoint>,
    pub ai_summary: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<AssetTag>,
}

impl MediaAsset {
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}
