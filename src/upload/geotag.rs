use std::io::Cursor;

use chrono::{DateTime, NaiveDate, Utc};
use exif::{Exif, In, Reader, Tag, Value};

/// Location and capture time read from an image's EXIF block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geotag {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl Geotag {
    /// Both coordinates, or nothing.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Reads GPS position and `DateTimeOriginal` from image bytes. Images without
/// EXIF, or with a block that fails to parse, give an empty geotag.
#[must_use]
pub fn read_geotag(data: &[u8]) -> Geotag {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::debug!("no usable EXIF data: {e}");
            return Geotag::default();
        }
    };

    let latitude = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S');
    let longitude = coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W');

    // Half a coordinate pair is as good as none.
    let (latitude, longitude) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    Geotag {
        latitude,
        longitude,
        captured_at: captured_at(&exif),
    }
}

fn coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag, negative_ref: char) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref parts) = field.value else {
        return None;
    };
    if parts.len() < 3 || parts.iter().any(|r| r.denom == 0) {
        return None;
    }

    let value = dms_to_decimal(parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64());

    let negative = exif
        .get_field(ref_tag, In::PRIMARY)
        .is_some_and(|r| r.display_value().to_string().contains(negative_ref));

    Some(if negative { -value } else { value })
}

fn captured_at(exif: &Exif) -> Option<DateTime<Utc>> {
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    let Value::Ascii(ref values) = field.value else {
        return None;
    };
    let raw = exif::DateTime::from_ascii(values.first()?).ok()?;

    // EXIF carries no zone here; treat the camera clock as UTC.
    NaiveDate::from_ymd_opt(i32::from(raw.year), u32::from(raw.month), u32::from(raw.day))?
        .and_hms_opt(
            u32::from(raw.hour),
            u32::from(raw.minute),
            u32::from(raw.second),
        )
        .map(|naive| naive.and_utc())
}

#[must_use]
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A minimal JPEG whose only content is an EXIF block with a GPS IFD.
    /// Each coordinate is `(numerator, denominator)` degrees with zero
    /// minutes and seconds, so decimal values come out exact.
    pub fn jpeg_with_gps(lat: (u32, u32), lat_ref: u8, lon: (u32, u32), lon_ref: u8) -> Vec<u8> {
        let mut tiff = Vec::new();
        // Little-endian header, IFD0 at offset 8
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());

        // IFD0: a single GPS pointer
        tiff.extend_from_slice(&1u16.to_le_bytes());
        entry(&mut tiff, 0x8825, 4, 1, 26);
        tiff.extend_from_slice(&0u32.to_le_bytes());

        // GPS IFD at 26, values at 80 and 104
        tiff.extend_from_slice(&4u16.to_le_bytes());
        entry(&mut tiff, 0x0001, 2, 2, u32::from(lat_ref));
        entry(&mut tiff, 0x0002, 5, 3, 80);
        entry(&mut tiff, 0x0003, 2, 2, u32::from(lon_ref));
        entry(&mut tiff, 0x0004, 5, 3, 104);
        tiff.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(tiff.len(), 80);

        for (num, denom) in [lat, (0, 1), (0, 1), lon, (0, 1), (0, 1)] {
            tiff.extend_from_slice(&num.to_le_bytes());
            tiff.extend_from_slice(&denom.to_le_bytes());
        }

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        let len = u16::try_from(app1.len() + 2).unwrap();
        jpeg.extend_from_slice(&len.to_be_bytes());
        jpeg.extend_from_slice(&app1);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    // ASCII refs fit inline: the letter followed by NUL padding.
    fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
}
