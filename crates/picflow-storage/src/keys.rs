//! Shared key generation.
//!
//! Every file derived from one upload shares the `{owner_id}/{uuid}` stem of its raw key,
//! so an asset's files can be located from any one of them.

use uuid::Uuid;

/// Prefix for bytes persisted exactly as uploaded.
pub const RAW_PREFIX: &str = "raw";

/// Generate the storage key for a fresh raw upload.
///
/// `extension` is appended when present; it is expected to be already sanitized
/// (see `RawUpload::extension`).
pub fn raw_key(owner_id: Uuid, extension: Option<&str>) -> String {
    let id = Uuid::new_v4();
    match extension {
        Some(ext) => format!("{}/{}/{}.{}", RAW_PREFIX, owner_id, id, ext),
        None => format!("{}/{}/{}", RAW_PREFIX, owner_id, id),
    }
}

/// Derive a sibling key under `prefix` with a new extension.
///
/// `derived_key("thumbnails", "raw/o/abc.heic", "jpg")` is `thumbnails/o/abc.jpg`.
pub fn derived_key(prefix: &str, raw_key: &str, extension: &str) -> String {
    let rest = raw_key
        .strip_prefix(RAW_PREFIX)
        .and_then(|r| r.strip_prefix('/'))
        .unwrap_or(raw_key);

    let file_start = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem = match rest[file_start..].rfind('.') {
        Some(dot) if dot > 0 => &rest[..file_start + dot],
        _ => rest,
    };

    format!("{}/{}.{}", prefix, stem, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_key_is_owner_scoped() {
        let owner = Uuid::new_v4();
        let key = raw_key(owner, Some("jpg"));
        assert!(key.starts_with(&format!("raw/{}/", owner)));
        assert!(key.ends_with(".jpg"));

        let bare = raw_key(owner, None);
        assert!(!bare.contains('.'));
    }

    #[test]
    fn test_derived_key_swaps_prefix_and_extension() {
        assert_eq!(
            derived_key("thumbnails", "raw/o/abc.heic", "jpg"),
            "thumbnails/o/abc.jpg"
        );
        assert_eq!(
            derived_key("originals", "raw/o/abc", "png"),
            "originals/o/abc.png"
        );
    }

    #[test]
    fn test_derived_key_ignores_dots_in_directories() {
        assert_eq!(
            derived_key("originals", "raw/o.v2/abc", "jpg"),
            "originals/o.v2/abc.jpg"
        );
    }
}
