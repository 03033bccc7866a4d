//! The fixed catalogue of scalar channels stored per field cell.
//!
//! Every cell of the environment field carries one `f32` per [`Layer`].
//! Layer ids are stable: they double as the offset of the channel inside a
//! cell's contiguous slice of the chunk buffer, so reordering the variants
//! would silently reinterpret persisted or in-flight data.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Number of layers stored for every cell.
pub const LAYER_COUNT: usize = 21;

/// Error returned when an integer does not name a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("layer index {index} is out of range (0..{LAYER_COUNT})")]
pub struct InvalidLayer {
    /// The rejected index.
    pub index: usize,
}

/// A named scalar channel of the environment field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Air temperature in degrees Celsius.
    Temperature,
    /// Relative humidity, nominally `0.0..=1.0`.
    Humidity,
    /// Water held in the topsoil.
    SoilMoisture,
    /// Water that percolated below the topsoil.
    Groundwater,
    /// East-west wind component.
    WindX,
    /// North-south wind component.
    WindY,
    /// Vertical wind component (convection).
    WindZ,
    /// Light intensity reaching the ground.
    Light,
    /// Ultraviolet intensity reaching the ground.
    Ultraviolet,
    /// Air pressure.
    Pressure,
    /// Terrain height.
    Elevation,
    /// Soil nutrient concentration.
    Nutrients,
    /// Plant cover density.
    Vegetation,
    /// Living biomass per cell.
    Biomass,
    /// Oxygen concentration.
    Oxygen,
    /// Carbon dioxide concentration.
    CarbonDioxide,
    /// Environmental toxin concentration.
    Toxicity,
    /// Soil and water salinity.
    Salinity,
    /// Snow depth.
    SnowCover,
    /// Background radiation.
    Radiation,
    /// Scent trail intensity left by creatures.
    Scent,
}

impl Layer {
    /// Every layer, ordered by id.
    pub const ALL: [Self; LAYER_COUNT] = [
        Self::Temperature,
        Self::Humidity,
        Self::SoilMoisture,
        Self::Groundwater,
        Self::WindX,
        Self::WindY,
        Self::WindZ,
        Self::Light,
        Self::Ultraviolet,
        Self::Pressure,
        Self::Elevation,
        Self::Nutrients,
        Self::Vegetation,
        Self::Biomass,
        Self::Oxygen,
        Self::CarbonDioxide,
        Self::Toxicity,
        Self::Salinity,
        Self::SnowCover,
        Self::Radiation,
        Self::Scent,
    ];

    /// Stable integer id of this layer (its offset within a cell).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up a layer by id.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Snake-case name used in configuration files and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::SoilMoisture => "soil_moisture",
            Self::Groundwater => "groundwater",
            Self::WindX => "wind_x",
            Self::WindY => "wind_y",
            Self::WindZ => "wind_z",
            Self::Light => "light",
            Self::Ultraviolet => "ultraviolet",
            Self::Pressure => "pressure",
            Self::Elevation => "elevation",
            Self::Nutrients => "nutrients",
            Self::Vegetation => "vegetation",
            Self::Biomass => "biomass",
            Self::Oxygen => "oxygen",
            Self::CarbonDioxide => "carbon_dioxide",
            Self::Toxicity => "toxicity",
            Self::Salinity => "salinity",
            Self::SnowCover => "snow_cover",
            Self::Radiation => "radiation",
            Self::Scent => "scent",
        }
    }
}

impl TryFrom<usize> for Layer {
    type Error = InvalidLayer;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(InvalidLayer { index })
    }
}

impl core::fmt::Display for Layer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_catalogue_order() {
        for (position, layer) in Layer::ALL.iter().enumerate() {
            assert_eq!(layer.index(), position);
            assert_eq!(Layer::from_index(position), Some(*layer));
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        assert_eq!(Layer::try_from(LAYER_COUNT), Err(InvalidLayer { index: LAYER_COUNT }));
        assert_eq!(Layer::try_from(usize::MAX).map_err(|e| e.index), Err(usize::MAX));
    }

    #[test]
    fn serde_name_matches_display() {
        let json = serde_json::to_string(&Layer::SoilMoisture).ok();
        assert_eq!(json.as_deref(), Some("\"soil_moisture\""));
        assert_eq!(Layer::SoilMoisture.to_string(), "soil_moisture");
    }
}
