pub mod draft;
pub mod geo;
pub mod media;

pub use draft::{IngestionDraft, RawUpload, Resolution};
pub use geo::GeoPoint;
pub use media::{AssetTag, MediaAsset, Tag, TagSource};
