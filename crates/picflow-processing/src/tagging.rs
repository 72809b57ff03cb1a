//! Auto-tag synthesis
//!
//! Tags derived at ingestion time, in a fixed order: capture-time buckets, camera
//! make, the has-location marker, then place names from the geocoder.

use crate::metadata::ExifMetadata;
use chrono::{Datelike, NaiveDateTime, Timelike};
use picflow_core::constants::HAS_LOCATION_TAG;
use std::collections::HashSet;

/// Insertion-ordered list of unique tag names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagList {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` unless it is empty or already present. Returns whether it was added.
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.is_empty() || self.seen.contains(&name) {
            return false;
        }
        self.seen.insert(name.clone());
        self.names.push(name);
        true
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn into_vec(self) -> Vec<String> {
        self.names
    }
}

/// Day-part bucket for a local hour.
pub fn day_part(hour: u32) -> &'static str {
    match hour {
        5..=11 => "上午",
        12..=17 => "下午",
        18..=21 => "夜晚",
        _ => "深夜",
    }
}

/// Build the auto-tag list for one upload.
pub fn synthesize_tags(
    metadata: &ExifMetadata,
    capture_time: Option<NaiveDateTime>,
    place_tags: &[String],
) -> Vec<String> {
    let mut tags = TagList::new();

    if let Some(taken) = capture_time {
        tags.push(format!("{}年", taken.year()));
        tags.push(format!("{}月", taken.month()));
        tags.push(day_part(taken.hour()));
    }

    if let Some(make) = metadata.make() {
        tags.push(make);
    }

    if metadata.has_gps() {
        tags.push(HAS_LOCATION_TAG);
    }

    tags.extend(place_tags.iter().cloned());
    tags.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::GpsBlock;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_time_tags_without_gps() {
        let tags = synthesize_tags(&ExifMetadata::default(), Some(at(2025, 7, 17, 14)), &[]);
        assert_eq!(tags, vec!["2025年", "7月", "下午"]);
    }

    #[test]
    fn test_day_part_boundaries() {
        assert_eq!(day_part(4), "深夜");
        assert_eq!(day_part(5), "上午");
        assert_eq!(day_part(11), "上午");
        assert_eq!(day_part(12), "下午");
        assert_eq!(day_part(17), "下午");
        assert_eq!(day_part(18), "夜晚");
        assert_eq!(day_part(21), "夜晚");
        assert_eq!(day_part(22), "深夜");
        assert_eq!(day_part(0), "深夜");
    }

    #[test]
    fn test_full_order_and_dedup() {
        let mut metadata = ExifMetadata::default();
        metadata
            .fields
            .insert("Make".to_string(), " Apple\0".to_string());
        metadata.gps = Some(GpsBlock::default());

        let places = vec![
            "中国".to_string(),
            "浙江省".to_string(),
            "杭州市".to_string(),
            "Apple".to_string(),
        ];
        let tags = synthesize_tags(&metadata, Some(at(2024, 12, 1, 23)), &places);
        assert_eq!(
            tags,
            vec!["2024年", "12月", "深夜", "Apple", "有定位", "中国", "浙江省", "杭州市"]
        );
    }

    #[test]
    fn test_gps_marker_without_coordinates() {
        let metadata = ExifMetadata {
            gps: Some(GpsBlock::default()),
            ..Default::default()
        };
        assert_eq!(synthesize_tags(&metadata, None, &[]), vec!["有定位"]);
    }

    #[test]
    fn test_no_case_folding() {
        let mut list = TagList::new();
        assert!(list.push("Beach"));
        assert!(list.push("beach"));
        assert!(!list.push("Beach"));
        assert!(!list.push(""));
        assert_eq!(list.len(), 2);
    }
}
