//! Band raster parsing
//!
//! Bundle files are single-band GeoTIFFs named like
//! `HLSS30.020_B04_doy2023153_aid0001.tif`. The band token and the 7-digit
//! `YYYYDDD` acquisition token come from the file name; pixel coordinates come
//! from the file's own GeoTIFF georeferencing.

use chrono::NaiveDate;
use climatech_common::time::parse_year_doy;
use regex::Regex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::models::{Band, ExtractedPoint};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GDAL_NODATA: u16 = 42113;

/// Directory key for a GeoTIFF tag; named variants where the decoder has them
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File name does not match <band>_doy<YYYYDDD>_: {0}")]
    FileName(String),

    #[error("Unknown band code '{0}'")]
    UnknownBand(String),

    #[error("Invalid acquisition date token '{0}'")]
    InvalidDate(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Missing georeferencing: {0}")]
    Georeference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Name-level problems (file skipped before the raster is opened)
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ExtractError::FileName(_) | ExtractError::UnknownBand(_) | ExtractError::InvalidDate(_)
        )
    }
}

impl From<tiff::TiffError> for ExtractError {
    fn from(e: tiff::TiffError) -> Self {
        ExtractError::Tiff(e.to_string())
    }
}

/// Band and acquisition date decoded from a bundle file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFileName {
    pub band: Band,
    pub capture_date: NaiveDate,
}

fn file_name_pattern() -> Result<&'static Regex, ExtractError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(B8A|B\d+|Fmask|SAA|SZA|VAA|VZA)_doy(\d{7})_"))
        .as_ref()
        .map_err(|e| ExtractError::FileName(format!("pattern failed to compile: {}", e)))
}

/// Normalize a band token: digits zero-padded to two (`B4` → `b04`), the
/// rest lower-cased (`B8A` → `b8a`, `Fmask` → `fmask`)
fn normalize_band_token(token: &str) -> String {
    match token.strip_prefix('B').map(str::parse::<u32>) {
        Some(Ok(number)) => format!("b{:02}", number),
        _ => token.to_ascii_lowercase(),
    }
}

pub fn parse_file_name(file_name: &str) -> Result<ParsedFileName, ExtractError> {
    let captures = file_name_pattern()?
        .captures(file_name)
        .ok_or_else(|| ExtractError::FileName(file_name.to_string()))?;

    let code = normalize_band_token(&captures[1]);
    let band = Band::from_code(&code).ok_or(ExtractError::UnknownBand(code))?;

    let token = &captures[2];
    let capture_date =
        parse_year_doy(token).ok_or_else(|| ExtractError::InvalidDate(token.to_string()))?;

    Ok(ParsedFileName { band, capture_date })
}

/// Affine pixel → lon/lat transform (GDAL coefficient order)
///
/// `x = c[0] + col·c[1] + row·c[2]`, `y = c[3] + col·c[4] + row·c[5]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform from ModelPixelScale and the first ModelTiepoint
    pub fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        let (sx, sy) = (*scale.first()?, *scale.get(1)?);
        let (i, j, x, y) = (*tiepoint.first()?, *tiepoint.get(1)?, *tiepoint.get(3)?, *tiepoint.get(4)?);
        Some(Self([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
    }

    /// From a row-major 4x4 ModelTransformation matrix
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self([m[3], m[0], m[1], m[7], m[4], m[5]]))
    }

    /// Geographic coordinates (lon, lat) of a pixel center
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let c = &self.0;
        let (px, py) = (col as f64 + 0.5, row as f64 + 0.5);
        (c[0] + px * c[1] + py * c[2], c[3] + px * c[4] + py * c[5])
    }
}

/// First sample plane of a GeoTIFF as f64 values, row-major
#[derive(Debug, Clone)]
pub struct BandRaster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
    pub values: Vec<f64>,
}

impl BandRaster {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let reader = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(reader)?;

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let transform = read_transform(&mut decoder)?;
        let nodata = match decoder.find_tag(geo_tag(TAG_GDAL_NODATA))? {
            Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse::<f64>().ok(),
            None => None,
        };

        let samples = decoding_result_to_f64(decoder.read_image()?)?;
        let pixels = width * height;
        if pixels == 0 || samples.len() < pixels {
            return Err(ExtractError::Tiff(format!(
                "expected {} samples, decoded {}",
                pixels,
                samples.len()
            )));
        }

        // Chunky multi-sample images interleave; keep the first sample
        let stride = samples.len() / pixels;
        let values = if stride == 1 {
            samples
        } else {
            samples.into_iter().step_by(stride).take(pixels).collect()
        };

        Ok(Self {
            width,
            height,
            transform,
            nodata,
            values,
        })
    }

    fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nodata| value == nodata)
    }

    /// Georeferenced samples, skipping NaN and nodata pixels
    pub fn points(&self, band: Band, capture_date: NaiveDate) -> Vec<ExtractedPoint> {
        let mut points = Vec::with_capacity(self.values.len());
        for row in 0..self.height {
            for col in 0..self.width {
                let value = self.values[row * self.width + col];
                if self.is_nodata(value) {
                    continue;
                }
                let (longitude, latitude) = self.transform.pixel_center(col, row);
                points.push(ExtractedPoint {
                    band,
                    capture_date,
                    latitude,
                    longitude,
                    value,
                });
            }
        }
        points
    }
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform, ExtractError> {
    if let Some(matrix) = decoder.find_tag(geo_tag(TAG_MODEL_TRANSFORMATION))? {
        let matrix = matrix.into_f64_vec()?;
        return GeoTransform::from_model_transformation(&matrix)
            .ok_or_else(|| ExtractError::Georeference("short ModelTransformation".to_string()));
    }

    let scale = decoder
        .find_tag(geo_tag(TAG_MODEL_PIXEL_SCALE))?
        .ok_or_else(|| ExtractError::Georeference("no ModelPixelScale tag".to_string()))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(geo_tag(TAG_MODEL_TIEPOINT))?
        .ok_or_else(|| ExtractError::Georeference("no ModelTiepoint tag".to_string()))?
        .into_f64_vec()?;

    GeoTransform::from_scale_and_tiepoint(&scale, &tiepoint)
        .ok_or_else(|| ExtractError::Georeference("short ModelPixelScale/ModelTiepoint".to_string()))
}

fn decoding_result_to_f64(result: DecodingResult) -> Result<Vec<f64>, ExtractError> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(ExtractError::Tiff("unsupported sample format".to_string())),
    };
    Ok(values)
}

/// Parse the file name, then read every valid pixel of the raster
pub fn extract_points(path: &Path, file_name: &str) -> Result<Vec<ExtractedPoint>, ExtractError> {
    let parsed = parse_file_name(file_name)?;
    let raster = BandRaster::open(path)?;
    let points = raster.points(parsed.band, parsed.capture_date);

    tracing::debug!(
        file = file_name,
        band = %parsed.band,
        date = %parsed.capture_date,
        width = raster.width,
        height = raster.height,
        points = points.len(),
        "Raster extracted"
    );
    Ok(points)
}

/// [`extract_points`] on the blocking pool
pub async fn extract_points_blocking(
    path: PathBuf,
    file_name: String,
) -> Result<Vec<ExtractedPoint>, ExtractError> {
    tokio::task::spawn_blocking(move || extract_points(&path, &file_name))
        .await
        .map_err(|e| ExtractError::Tiff(format!("extraction task failed: {}", e)))?
}
