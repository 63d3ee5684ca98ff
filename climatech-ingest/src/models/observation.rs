//! Satellite observation types
//!
//! A [`Band`] is one layer of the HLS product. Reflectance bands own a column
//! in `harmonized_landsat_sentinel_data`; the quality and geometry layers are
//! kept in the record's `additional_data` JSON map.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// HLS layer delivered as one raster file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    B8A,
    B09,
    B10,
    B11,
    B12,
    Fmask,
    Saa,
    Sza,
    Vaa,
    Vza,
}

/// Where a band's value is stored on an observation record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandTarget {
    /// Dedicated REAL column
    Column(&'static str),
    /// Key inside the `additional_data` JSON map
    Additional(&'static str),
}

impl BandTarget {
    pub fn name(&self) -> &'static str {
        match self {
            BandTarget::Column(name) | BandTarget::Additional(name) => name,
        }
    }
}

impl Band {
    /// Every layer requested from the imagery API, in request order
    pub const ALL: [Band; 18] = [
        Band::B01,
        Band::B02,
        Band::B03,
        Band::B04,
        Band::B05,
        Band::B06,
        Band::B07,
        Band::B08,
        Band::B09,
        Band::B10,
        Band::B11,
        Band::B12,
        Band::B8A,
        Band::Fmask,
        Band::Saa,
        Band::Sza,
        Band::Vaa,
        Band::Vza,
    ];

    /// Near-infrared band used for NDVI
    pub const NIR: Band = Band::B05;
    /// Red band used for NDVI
    pub const RED: Band = Band::B04;

    /// Normalized band code (`b04`, `b8a`, `fmask`, ...)
    pub fn code(&self) -> &'static str {
        match self {
            Band::B01 => "b01",
            Band::B02 => "b02",
            Band::B03 => "b03",
            Band::B04 => "b04",
            Band::B05 => "b05",
            Band::B06 => "b06",
            Band::B07 => "b07",
            Band::B08 => "b08",
            Band::B8A => "b8a",
            Band::B09 => "b09",
            Band::B10 => "b10",
            Band::B11 => "b11",
            Band::B12 => "b12",
            Band::Fmask => "fmask",
            Band::Saa => "saa",
            Band::Sza => "sza",
            Band::Vaa => "vaa",
            Band::Vza => "vza",
        }
    }

    /// Look up a normalized band code; unknown codes yield `None`
    pub fn from_code(code: &str) -> Option<Band> {
        let code = code.to_ascii_lowercase();
        Band::ALL.iter().copied().find(|band| band.code() == code)
    }

    /// Layer name as used by the imagery API (`B04`, `B8A`, `Fmask`, `SAA`)
    pub fn layer_name(&self) -> &'static str {
        match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B8A => "B8A",
            Band::B09 => "B09",
            Band::B10 => "B10",
            Band::B11 => "B11",
            Band::B12 => "B12",
            Band::Fmask => "Fmask",
            Band::Saa => "SAA",
            Band::Sza => "SZA",
            Band::Vaa => "VAA",
            Band::Vza => "VZA",
        }
    }

    pub fn target(&self) -> BandTarget {
        match self {
            Band::B01 => BandTarget::Column("b01_coastal_aerosol"),
            Band::B02 => BandTarget::Column("b02_blue"),
            Band::B03 => BandTarget::Column("b03_green"),
            Band::B04 => BandTarget::Column("b04_red"),
            Band::B05 => BandTarget::Column("b05_nir"),
            Band::B06 => BandTarget::Column("b06_swir1"),
            Band::B07 => BandTarget::Column("b07_swir2"),
            Band::B08 => BandTarget::Column("b08_nir_broad"),
            Band::B8A => BandTarget::Column("b8a_nir_narrow"),
            Band::B09 => BandTarget::Column("b09_water_vapor"),
            Band::B10 => BandTarget::Column("b10_cirrus"),
            Band::B11 => BandTarget::Column("b11_swir1"),
            Band::B12 => BandTarget::Column("b12_swir2"),
            Band::Fmask => BandTarget::Additional("fmask_quality_bits"),
            Band::Saa => BandTarget::Additional("saa_sun_azimuth"),
            Band::Sza => BandTarget::Additional("sza_sun_zenith"),
            Band::Vaa => BandTarget::Additional("vaa_view_azimuth"),
            Band::Vza => BandTarget::Additional("vza_view_zenith"),
        }
    }

    /// Reflectance column names, in table order
    pub fn reflectance_columns() -> impl Iterator<Item = &'static str> {
        Band::ALL.iter().filter_map(|band| match band.target() {
            BandTarget::Column(name) => Some(name),
            BandTarget::Additional(_) => None,
        })
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One georeferenced pixel value read from a band raster
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPoint {
    pub band: Band,
    pub capture_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// NDVI sample for map rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub ndvi: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_round_trip_through_lookup() {
        for band in Band::ALL {
            assert_eq!(Band::from_code(band.code()), Some(band));
        }
        assert_eq!(Band::from_code("B8A"), Some(Band::B8A));
        assert_eq!(Band::from_code("b13"), None);
    }

    #[test]
    fn test_thirteen_distinct_reflectance_columns() {
        let columns: HashSet<_> = Band::reflectance_columns().collect();
        assert_eq!(columns.len(), 13);
        assert!(columns.contains("b05_nir"));
        assert!(columns.contains("b8a_nir_narrow"));
    }

    #[test]
    fn test_ancillary_layers_use_additional_data() {
        assert_eq!(Band::Fmask.target(), BandTarget::Additional("fmask_quality_bits"));
        assert_eq!(Band::Vza.target(), BandTarget::Additional("vza_view_zenith"));
        assert_eq!(Band::Saa.layer_name(), "SAA");
    }
}
