//! GPS coordinate conversion
//!
//! Turns the degrees/minutes/seconds encoding found in a GPS IFD into a signed
//! decimal `GeoPoint`. Malformed components degrade to `0.0` instead of discarding
//! the whole coordinate, so a photo with a bad seconds field still lands near the
//! right place.

use picflow_core::GeoPoint;
use std::collections::BTreeMap;

/// One degrees/minutes/seconds component as it was stored.
#[derive(Clone, Debug, PartialEq)]
pub enum GpsComponent {
    Rational { num: i64, den: i64 },
    Scalar(f64),
    /// Anything that could not be read as a number (the original text is kept for logs).
    Invalid(String),
}

impl GpsComponent {
    /// Parse a textual component: `"30"`, `"15.5"` or `"1/3"`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((num, den)) = raw.split_once('/') {
            return match (num.trim().parse::<i64>(), den.trim().parse::<i64>()) {
                (Ok(num), Ok(den)) => GpsComponent::Rational { num, den },
                _ => GpsComponent::Invalid(raw.to_string()),
            };
        }
        match raw.parse::<f64>() {
            Ok(v) => GpsComponent::Scalar(v),
            Err(_) => GpsComponent::Invalid(raw.to_string()),
        }
    }

    /// Real value of the component, or `None` when it is not a finite number.
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            GpsComponent::Rational { den: 0, .. } => return None,
            GpsComponent::Rational { num, den } => *num as f64 / *den as f64,
            GpsComponent::Scalar(v) => *v,
            GpsComponent::Invalid(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// The raw GPS sub-block of an image's metadata.
///
/// Present whenever the image carried any GPS field, even if the coordinates
/// themselves are missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GpsBlock {
    pub latitude: Option<Vec<GpsComponent>>,
    pub latitude_ref: Option<String>,
    pub longitude: Option<Vec<GpsComponent>>,
    pub longitude_ref: Option<String>,
    /// Every GPS field rendered as text, keyed by tag name.
    pub raw: BTreeMap<String, String>,
}

impl GpsBlock {
    /// Convert to a signed decimal point.
    ///
    /// Latitude is negated unless its reference is exactly `"N"`, longitude unless it
    /// is exactly `"E"`. Returns `None` when either coordinate list is missing or the
    /// result is outside the valid range.
    pub fn to_geo_point(&self) -> Option<GeoPoint> {
        let latitude = self.latitude.as_deref()?;
        let longitude = self.longitude.as_deref()?;

        let mut lat = dms_to_decimal(latitude);
        let mut lon = dms_to_decimal(longitude);

        if !hemisphere_is(self.latitude_ref.as_deref(), "N") {
            lat = -lat;
        }
        if !hemisphere_is(self.longitude_ref.as_deref(), "E") {
            lon = -lon;
        }

        let point = GeoPoint::new(lat, lon);
        if point.is_none() {
            tracing::warn!(lat, lon, "GPS coordinates out of range, ignoring");
        }
        point
    }
}

fn hemisphere_is(reference: Option<&str>, expected: &str) -> bool {
    match reference {
        Some(r) => r.trim_matches(|c: char| c.is_whitespace() || c == '\0') == expected,
        None => {
            tracing::debug!(expected, "GPS hemisphere reference missing");
            false
        }
    }
}

/// `degrees + minutes/60 + seconds/3600`; missing or unreadable components count as zero.
pub fn dms_to_decimal(components: &[GpsComponent]) -> f64 {
    let value_at = |index: usize| -> f64 {
        match components.get(index) {
            Some(component) => component.to_f64().unwrap_or_else(|| {
                tracing::warn!(index, component = ?component, "Unreadable GPS component, using 0");
                0.0
            }),
            None => {
                tracing::warn!(index, "Missing GPS component, using 0");
                0.0
            }
        }
    };

    value_at(0) + value_at(1) / 60.0 + value_at(2) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dms(d: i64, m: i64, s: i64) -> Vec<GpsComponent> {
        vec![
            GpsComponent::Rational { num: d, den: 1 },
            GpsComponent::Rational { num: m, den: 1 },
            GpsComponent::Rational { num: s, den: 1 },
        ]
    }

    fn block(lat_ref: &str, lon_ref: &str) -> GpsBlock {
        GpsBlock {
            latitude: Some(dms(30, 15, 0)),
            latitude_ref: Some(lat_ref.to_string()),
            longitude: Some(dms(120, 9, 0)),
            longitude_ref: Some(lon_ref.to_string()),
            raw: BTreeMap::new(),
        }
    }

    #[test]
    fn test_north_east_is_positive() {
        let point = block("N", "E").to_geo_point().unwrap();
        assert!((point.latitude() - 30.25).abs() < 1e-9);
        assert!((point.longitude() - 120.15).abs() < 1e-9);
    }

    #[test]
    fn test_south_west_is_negative() {
        let point = block("S", "W").to_geo_point().unwrap();
        assert!((point.latitude() + 30.25).abs() < 1e-9);
        assert!((point.longitude() + 120.15).abs() < 1e-9);
    }

    #[test]
    fn test_missing_reference_negates() {
        let mut gps = block("N", "E");
        gps.latitude_ref = None;
        let point = gps.to_geo_point().unwrap();
        assert!(point.latitude() < 0.0);
        assert!(point.longitude() > 0.0);
    }

    #[test]
    fn test_zero_denominator_counts_as_zero() {
        let components = vec![
            GpsComponent::Rational { num: 30, den: 1 },
            GpsComponent::Rational { num: 15, den: 1 },
            GpsComponent::Rational { num: 7, den: 0 },
        ];
        assert!((dms_to_decimal(&components) - 30.25).abs() < 1e-9);
    }

    #[test]
    fn test_short_component_list_pads_with_zero() {
        let components = vec![GpsComponent::Scalar(45.5)];
        assert!((dms_to_decimal(&components) - 45.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_longitude_yields_none() {
        let mut gps = block("N", "E");
        gps.longitude = None;
        assert!(gps.to_geo_point().is_none());
    }

    #[test]
    fn test_out_of_range_yields_none() {
        let gps = GpsBlock {
            latitude: Some(dms(95, 0, 0)),
            latitude_ref: Some("N".into()),
            longitude: Some(dms(10, 0, 0)),
            longitude_ref: Some("E".into()),
            raw: BTreeMap::new(),
        };
        assert!(gps.to_geo_point().is_none());
    }

    #[test]
    fn test_parse_components() {
        assert_eq!(
            GpsComponent::parse("1/3"),
            GpsComponent::Rational { num: 1, den: 3 }
        );
        assert_eq!(GpsComponent::parse(" 15.5 "), GpsComponent::Scalar(15.5));
        assert!(matches!(GpsComponent::parse("abc"), GpsComponent::Invalid(_)));
        assert_eq!(GpsComponent::parse("abc").to_f64(), None);
        assert_eq!(GpsComponent::Scalar(f64::NAN).to_f64(), None);
    }
}
