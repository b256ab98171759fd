#![allow(dead_code)]

mod test_app;

pub use test_app::{MultipartBody, PASSWORD, TestApp, TestResponse};

/// A minimal JPEG whose only content is an EXIF block with a GPS IFD.
/// Coordinates are whole `(numerator, denominator)` degrees.
pub fn jpeg_with_gps(lat: (u32, u32), lat_ref: u8, lon: (u32, u32), lon_ref: u8) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    entry(&mut tiff, 0x8825, 4, 1, 26);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(&4u16.to_le_bytes());
    entry(&mut tiff, 0x0001, 2, 2, u32::from(lat_ref));
    entry(&mut tiff, 0x0002, 5, 3, 80);
    entry(&mut tiff, 0x0003, 2, 2, u32::from(lon_ref));
    entry(&mut tiff, 0x0004, 5, 3, 104);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    for (num, denom) in [lat, (0, 1), (0, 1), lon, (0, 1), (0, 1)] {
        tiff.extend_from_slice(&num.to_le_bytes());
        tiff.extend_from_slice(&denom.to_le_bytes());
    }

    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&tiff);

    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
    jpeg.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
    jpeg.extend_from_slice(&app1);
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
}
