//! Synthetic images for tests.
//!
//! `jpeg_with_exif` writes a little-endian TIFF block by hand and splices it into a real
//! JPEG as an APP1 segment, so the metadata paths can be tested without binary files
//! checked into the repository.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

type GpsFixture = ((&'static str, [u32; 3]), (&'static str, [u32; 3]));

/// Fields to embed. Unset fields are left out of the block.
#[derive(Clone, Debug, Default)]
pub struct ExifFixture {
    pub make: Option<String>,
    pub orientation: Option<u16>,
    pub date_time_original: Option<String>,
    /// ((lat_ref, [deg, min, sec]), (lon_ref, [deg, min, sec]))
    pub gps: Option<GpsFixture>,
}

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    payload: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, text: &str) -> Self {
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        Self {
            tag,
            kind: ASCII,
            count: payload.len() as u32,
            payload,
        }
    }

    fn short(tag: u16, value: u16) -> Self {
        Self {
            tag,
            kind: SHORT,
            count: 1,
            payload: value.to_le_bytes().to_vec(),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            kind: LONG,
            count: 1,
            payload: value.to_le_bytes().to_vec(),
        }
    }

    fn rationals(tag: u16, values: &[u32]) -> Self {
        let mut payload = Vec::with_capacity(values.len() * 8);
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
            payload.extend_from_slice(&1u32.to_le_bytes());
        }
        Self {
            tag,
            kind: RATIONAL,
            count: values.len() as u32,
            payload,
        }
    }

    fn external_len(&self) -> usize {
        if self.payload.len() <= 4 {
            0
        } else {
            self.payload.len() + self.payload.len() % 2
        }
    }
}

fn ifd_len(entries: &[Entry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(Entry::external_len).sum::<usize>()
}

/// Append one IFD that starts at TIFF offset `base` (which must equal `out.len()`).
fn write_ifd(out: &mut Vec<u8>, entries: &[Entry], base: usize) {
    let mut data_offset = base + 2 + 12 * entries.len() + 4;
    let mut data = Vec::new();

    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.kind.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        if entry.payload.len() <= 4 {
            let mut inline = entry.payload.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data.extend_from_slice(&entry.payload);
            if entry.payload.len() % 2 == 1 {
                data.push(0);
            }
            data_offset += entry.external_len();
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&data);
}

/// Little-endian TIFF block holding the fixture's fields.
pub fn tiff_block(fixture: &ExifFixture) -> Vec<u8> {
    let exif_entries: Vec<Entry> = fixture
        .date_time_original
        .iter()
        .map(|dt| Entry::ascii(0x9003, dt))
        .collect();

    let gps_entries: Vec<Entry> = match &fixture.gps {
        Some(((lat_ref, lat), (lon_ref, lon))) => vec![
            Entry::ascii(0x0001, lat_ref),
            Entry::rationals(0x0002, lat),
            Entry::ascii(0x0003, lon_ref),
            Entry::rationals(0x0004, lon),
        ],
        None => Vec::new(),
    };

    let mut ifd0 = Vec::new();
    if let Some(make) = &fixture.make {
        ifd0.push(Entry::ascii(0x010F, make));
    }
    if let Some(orientation) = fixture.orientation {
        ifd0.push(Entry::short(0x0112, orientation));
    }
    // Pointer values are patched below once the IFD0 size is known.
    if !exif_entries.is_empty() {
        ifd0.push(Entry::long(0x8769, 0));
    }
    if !gps_entries.is_empty() {
        ifd0.push(Entry::long(0x8825, 0));
    }

    let ifd0_offset = 8;
    let exif_offset = ifd0_offset + ifd_len(&ifd0);
    let gps_offset = exif_offset
        + if exif_entries.is_empty() {
            0
        } else {
            ifd_len(&exif_entries)
        };

    for entry in ifd0.iter_mut() {
        match entry.tag {
            0x8769 => entry.payload = (exif_offset as u32).to_le_bytes().to_vec(),
            0x8825 => entry.payload = (gps_offset as u32).to_le_bytes().to_vec(),
            _ => {}
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(ifd0_offset as u32).to_le_bytes());
    write_ifd(&mut out, &ifd0, ifd0_offset);
    if !exif_entries.is_empty() {
        write_ifd(&mut out, &exif_entries, exif_offset);
    }
    if !gps_entries.is_empty() {
        write_ifd(&mut out, &gps_entries, gps_offset);
    }
    out
}

/// A plain RGB JPEG (a horizontal gradient, so rotations are observable).
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        let v = ((x * 255) / width.max(1)) as u8;
        Rgb([v, 128, 255 - v])
    });
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&img)
        .expect("encode fixture jpeg");
    out
}

/// An RGBA PNG with a translucent alpha channel.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode fixture png");
    out.into_inner()
}

/// A JPEG with the fixture's EXIF block in an APP1 segment right after SOI.
pub fn jpeg_with_exif(fixture: &ExifFixture, width: u32, height: u32) -> Vec<u8> {
    let jpeg = jpeg_bytes(width, height);
    let tiff = tiff_block(fixture);

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}
