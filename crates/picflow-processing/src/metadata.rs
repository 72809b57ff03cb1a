//! EXIF metadata extraction
//!
//! Reads the primary IFD, the Exif sub-IFD and the GPS sub-IFD of an image through
//! `kamadak-exif`. Extraction never fails: images without EXIF, or with EXIF that
//! cannot be parsed at all, produce an empty result. Partially readable EXIF blocks
//! keep whatever fields could be read.

use crate::gps::{GpsBlock, GpsComponent};
use chrono::NaiveDateTime;
use exif::{Context, Field, In, Reader, Tag, Value};
use std::collections::BTreeMap;
use std::io::Cursor;

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Metadata read from the pre-rotation image bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct ExifMetadata {
    /// Tag name → value text for every non-GPS field of the primary image.
    pub fields: BTreeMap<String, String>,
    /// Raw GPS sub-block, present when the image carried any GPS field.
    pub gps: Option<GpsBlock>,
    /// EXIF orientation (1–8); 1 when absent or invalid.
    pub orientation: u8,
}

impl Default for ExifMetadata {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            gps: None,
            orientation: 1,
        }
    }
}

impl ExifMetadata {
    /// Extract metadata from raw image bytes.
    pub fn extract(data: &[u8]) -> Self {
        let mut reader = Reader::new();
        reader.continue_on_error(true);

        let exif = match reader.read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => exif,
            Err(exif::Error::PartialResult(partial)) => {
                let (exif, errors) = partial.into_inner();
                tracing::debug!(errors = errors.len(), "Partial EXIF result");
                exif
            }
            Err(e) => {
                tracing::debug!(error = %e, "No readable EXIF data");
                return Self::default();
            }
        };

        let mut metadata = Self::default();
        let mut gps = GpsBlock::default();
        let mut has_gps = false;

        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            if field.tag.context() == Context::Gps {
                has_gps = true;
                collect_gps_field(&mut gps, field);
                continue;
            }

            if field.tag == Tag::Orientation {
                metadata.orientation = field
                    .value
                    .get_uint(0)
                    .filter(|o| (1..=8).contains(o))
                    .map(|o| o as u8)
                    .unwrap_or(1);
            }

            metadata
                .fields
                .insert(field.tag.to_string(), value_text(field));
        }

        if has_gps {
            metadata.gps = Some(gps);
        }
        metadata
    }

    /// Value text for a tag name, e.g. `get("Make")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Capture time from `DateTimeOriginal`, as recorded by the camera (no time zone).
    pub fn capture_time(&self) -> Option<NaiveDateTime> {
        let raw = self.get("DateTimeOriginal")?;
        let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0' || c == '"');
        match NaiveDateTime::parse_from_str(trimmed, EXIF_DATETIME_FORMAT) {
            Ok(dt) => Some(dt),
            Err(e) => {
                tracing::debug!(value = %raw, error = %e, "Unparseable DateTimeOriginal");
                None
            }
        }
    }

    /// Camera manufacturer, trimmed of whitespace and NUL padding. `None` if blank.
    pub fn make(&self) -> Option<&str> {
        self.get("Make")
            .map(|m| m.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
            .filter(|m| !m.is_empty())
    }

    pub fn has_gps(&self) -> bool {
        self.gps.is_some()
    }
}

fn collect_gps_field(gps: &mut GpsBlock, field: &Field) {
    match field.tag {
        Tag::GPSLatitude => gps.latitude = Some(components(&field.value)),
        Tag::GPSLongitude => gps.longitude = Some(components(&field.value)),
        Tag::GPSLatitudeRef => gps.latitude_ref = Some(value_text(field)),
        Tag::GPSLongitudeRef => gps.longitude_ref = Some(value_text(field)),
        _ => {}
    }
    gps.raw.insert(field.tag.to_string(), value_text(field));
}

/// Degrees/minutes/seconds list out of whatever value type the writer used.
fn components(value: &Value) -> Vec<GpsComponent> {
    match value {
        Value::Rational(v) => v
            .iter()
            .map(|r| GpsComponent::Rational {
                num: r.num as i64,
                den: r.denom as i64,
            })
            .collect(),
        Value::SRational(v) => v
            .iter()
            .map(|r| GpsComponent::Rational {
                num: r.num as i64,
                den: r.denom as i64,
            })
            .collect(),
        Value::Float(v) => v.iter().map(|f| GpsComponent::Scalar(*f as f64)).collect(),
        Value::Double(v) => v.iter().map(|f| GpsComponent::Scalar(*f)).collect(),
        Value::Byte(v) => v.iter().map(|n| GpsComponent::Scalar(*n as f64)).collect(),
        Value::Short(v) => v.iter().map(|n| GpsComponent::Scalar(*n as f64)).collect(),
        Value::Long(v) => v.iter().map(|n| GpsComponent::Scalar(*n as f64)).collect(),
        Value::Ascii(parts) => parts
            .iter()
            .flat_map(|p| {
                String::from_utf8_lossy(p)
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(GpsComponent::parse)
                    .collect::<Vec<_>>()
            })
            .collect(),
        other => vec![GpsComponent::Invalid(format!("{:?}", other))],
    }
}

/// ASCII fields keep their raw text; everything else uses the library's display form.
fn value_text(field: &Field) -> String {
    match &field.value {
        Value::Ascii(parts) => parts
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        _ => field.display_value().to_string(),
    }
}
