//! GeoTIFF fixtures
//!
//! Single-band Gray32Float rasters georeferenced with ModelPixelScale and
//! ModelTiepoint, the layout the imagery API delivers with a geographic
//! projection.

use std::io::Cursor;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GDAL_NODATA: u16 = 42113;

/// Raster layout shared by the fixtures of one test
#[derive(Debug, Clone)]
pub struct RasterFixture {
    pub width: u32,
    pub height: u32,
    /// Upper-left corner (lon, lat)
    pub origin: (f64, f64),
    /// Pixel size in degrees
    pub pixel_size: f64,
    pub nodata: Option<f64>,
}

impl Default for RasterFixture {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
            origin: (-64.0, -30.9),
            pixel_size: 0.001,
            nodata: None,
        }
    }
}

impl RasterFixture {
    /// Pixel centre (lon, lat)
    pub fn pixel_center(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.origin.0 + (f64::from(col) + 0.5) * self.pixel_size,
            self.origin.1 - (f64::from(row) + 0.5) * self.pixel_size,
        )
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Encode `values` (row-major) as an in-memory GeoTIFF
pub fn write_band_tiff(fixture: &RasterFixture, values: &[f32]) -> Vec<u8> {
    assert_eq!(values.len(), fixture.pixel_count());

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(fixture.width, fixture.height)
            .unwrap();

        let scale = [fixture.pixel_size, fixture.pixel_size, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, fixture.origin.0, fixture.origin.1, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])
            .unwrap();
        if let Some(nodata) = fixture.nodata {
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_GDAL_NODATA), nodata.to_string().as_str())
                .unwrap();
        }

        image.write_data(values).unwrap();
    }
    cursor.into_inner()
}

/// Bundle file name in the imagery API's naming scheme
pub fn band_file_name(layer: &str, year_doy: &str) -> String {
    format!("HLSS30.020_{}_doy{}_aid0001.tif", layer, year_doy)
}
