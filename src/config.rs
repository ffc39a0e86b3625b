//! Pipeline configuration.
//!
//! All tables the transformation stages consume — rename mappings per extract
//! vocabulary, dtype hints, filter bounds, the selectable county list, the
//! archetype sample-size threshold, and the error policies — live in one
//! immutable [`PipelineConfig`] value that callers thread into every stage.
//! The value is serde-round-trippable so a run can be driven from a YAML file;
//! the built-in defaults cover the two known BER extract vocabularies.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::ColumnType;

/// Geographic join key for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Countyname,
    SmallArea,
}

impl Granularity {
    pub fn column(&self) -> &'static str {
        match self {
            Granularity::Countyname => "countyname",
            Granularity::SmallArea => "small_area",
        }
    }
}

#[derive(Debug, Error)]
#[error("'{0}' is not a supported granularity (expected 'countyname' or 'small_area')")]
pub struct ParseGranularityError(String);

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "countyname" => Ok(Granularity::Countyname),
            "small_area" | "small-area" => Ok(Granularity::SmallArea),
            other => Err(ParseGranularityError(other.to_string())),
        }
    }
}

/// How census slots join BER records: `Left` keeps every census slot and
/// drops unmatched BER records; `Outer` additionally keeps unmatched BERs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Left,
    Outer,
}

/// What to do when a named filter references a column the dataset lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingColumnPolicy {
    /// Fail the run. The historical engine skipped silently, which masked
    /// schema drift.
    #[default]
    Error,
    /// Skip the condition with a warning.
    Skip,
}

/// Inclusive-exclusive numeric bounds for one attribute. `None` leaves that
/// side unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn between(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn above(lower: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    pub fn below(upper: f64) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
        }
    }
}

/// Raw-header rename tables, one per extract vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameMappings {
    pub postcode: BTreeMap<String, String>,
    pub small_area: BTreeMap<String, String>,
}

impl RenameMappings {
    pub fn for_granularity(&self, granularity: Granularity) -> &BTreeMap<String, String> {
        match granularity {
            Granularity::Countyname => &self.postcode,
            Granularity::SmallArea => &self.small_area,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum group population (strictly exceeded) before a group's
    /// archetype is trusted.
    pub sample_size: usize,
    pub missing_column: MissingColumnPolicy,
    pub join: JoinKind,
    /// Raw `type_of_rating` labels marking provisional certificates; both
    /// extract vocabularies are covered.
    pub provisional_ratings: Vec<String>,
    pub bounds: BTreeMap<String, Bounds>,
    /// Selectable county/postcode values for the substring filter.
    pub countynames: Vec<String>,
    pub dtypes: BTreeMap<String, ColumnType>,
    pub mappings: RenameMappings,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).with_context(|| format!("Writing config to {path:?}"))
    }

    pub fn bounds_for(&self, attribute: &str) -> Option<Bounds> {
        self.bounds.get(attribute).copied()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_size: 30,
            missing_column: MissingColumnPolicy::default(),
            join: JoinKind::default(),
            provisional_ratings: vec!["Provisional    ".to_string(), "P ".to_string()],
            bounds: default_bounds(),
            countynames: default_countynames(),
            dtypes: default_dtypes(),
            mappings: RenameMappings {
                postcode: default_postcode_mappings(),
                small_area: default_small_area_mappings(),
            },
        }
    }
}

fn default_bounds() -> BTreeMap<String, Bounds> {
    let mut bounds = BTreeMap::new();
    bounds.insert("ground_floor_area".to_string(), Bounds::between(0.0, 1000.0));
    bounds.insert("living_area_percent".to_string(), Bounds::between(5.0, 90.0));
    bounds.insert(
        "main_sh_boiler_efficiency".to_string(),
        Bounds::between(19.0, 600.0),
    );
    bounds.insert(
        "main_hw_boiler_efficiency".to_string(),
        Bounds::between(19.0, 320.0),
    );
    bounds.insert(
        "main_sh_boiler_efficiency_adjustment_factor".to_string(),
        Bounds::above(0.7),
    );
    bounds.insert(
        "main_hw_boiler_efficiency_adjustment_factor".to_string(),
        Bounds::above(0.7),
    );
    bounds.insert("declared_loss_factor".to_string(), Bounds::below(20.0));
    bounds.insert(
        "thermal_bridging_factor".to_string(),
        Bounds::between(0.0, 0.15),
    );
    bounds
}

fn default_countynames() -> Vec<String> {
    [
        "Co. Carlow",
        "Co. Cavan",
        "Co. Clare",
        "Co. Cork",
        "Co. Donegal",
        "Co. Dublin",
        "Co. Galway",
        "Co. Kerry",
        "Co. Kildare",
        "Co. Kilkenny",
        "Co. Laois",
        "Co. Leitrim",
        "Co. Limerick",
        "Co. Longford",
        "Co. Louth",
        "Co. Mayo",
        "Co. Meath",
        "Co. Monaghan",
        "Co. Offaly",
        "Co. Roscommon",
        "Co. Sligo",
        "Co. Tipperary",
        "Co. Waterford",
        "Co. Westmeath",
        "Co. Wexford",
        "Co. Wicklow",
        "Cork City",
        "Dublin 1",
        "Dublin 10",
        "Dublin 11",
        "Dublin 12",
        "Dublin 13",
        "Dublin 14",
        "Dublin 15",
        "Dublin 16",
        "Dublin 17",
        "Dublin 18",
        "Dublin 2",
        "Dublin 20",
        "Dublin 22",
        "Dublin 24",
        "Dublin 3",
        "Dublin 4",
        "Dublin 5",
        "Dublin 6",
        "Dublin 6W",
        "Dublin 7",
        "Dublin 8",
        "Dublin 9",
        "Galway City",
        "Limerick City",
        "Waterford City",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_dtypes() -> BTreeMap<String, ColumnType> {
    let mut dtypes = BTreeMap::new();
    // Identifiers stay textual so leading zeros survive round trips.
    for name in [
        "small_area",
        "countyname",
        "electoral_district",
        "type_of_rating",
        "dwelling_type",
        "energy_rating",
        "main_sh_boiler_fuel",
        "suppl_sh_boiler_fuel",
        "main_hw_boiler_fuel",
        "suppl_hw_boiler_fuel",
        "ventilation_method_category",
        "structure_type_category",
        "wall_type_category",
        "insulation_category",
        "period_built",
    ] {
        dtypes.insert(name.to_string(), ColumnType::String);
    }
    dtypes.insert("building_id".to_string(), ColumnType::Guid);
    for name in ["year_of_construction", "no_of_storeys", "energy_value"] {
        dtypes.insert(name.to_string(), ColumnType::Integer);
    }
    for name in [
        "ground_floor_area",
        "first_floor_area",
        "second_floor_area",
        "third_floor_area",
        "room_in_roof_area",
        "living_area_percent",
        "main_sh_boiler_efficiency",
        "main_sh_boiler_efficiency_adjustment_factor",
        "main_hw_boiler_efficiency",
        "main_hw_boiler_efficiency_adjustment_factor",
        "declared_loss_factor",
        "thermal_bridging_factor",
        "wall_uvalue",
        "door_uvalue",
        "roof_uvalue",
        "floor_uvalue",
        "window_uvalue",
        "wall_area",
        "door_area",
        "roof_area",
        "floor_area",
        "window_area",
        "co2",
        "heat_loss_parameter",
        "delivered_energy",
    ] {
        dtypes.insert(name.to_string(), ColumnType::Float);
    }
    dtypes.insert(
        "is_period_built_estimated".to_string(),
        ColumnType::Boolean,
    );
    dtypes
}

fn default_postcode_mappings() -> BTreeMap<String, String> {
    [
        ("CountyName", "countyname"),
        ("TypeofRating", "type_of_rating"),
        ("Year_of_Construction", "year_of_construction"),
        ("DwellingTypeDescr", "dwelling_type"),
        ("EnergyRating", "energy_rating"),
        ("BerRating", "energy_value"),
        ("GroundFloorArea(sq m)", "ground_floor_area"),
        ("FirstFloorArea", "first_floor_area"),
        ("SecondFloorArea", "second_floor_area"),
        ("ThirdFloorArea", "third_floor_area"),
        ("RoomInRoofArea", "room_in_roof_area"),
        ("LivingAreaPercent", "living_area_percent"),
        ("HSMainSystemEfficiency", "main_sh_boiler_efficiency"),
        ("HSEffAdjFactor", "main_sh_boiler_efficiency_adjustment_factor"),
        ("WHMainSystemEff", "main_hw_boiler_efficiency"),
        ("WHEffAdjFactor", "main_hw_boiler_efficiency_adjustment_factor"),
        ("MainSpaceHeatingFuel", "main_sh_boiler_fuel"),
        ("MainWaterHeatingFuel", "main_hw_boiler_fuel"),
        ("SupplSHFuel", "suppl_sh_boiler_fuel"),
        ("SupplWHFuel", "suppl_hw_boiler_fuel"),
        ("DeclaredLossFactor", "declared_loss_factor"),
        ("ThermalBridgingFactor", "thermal_bridging_factor"),
        ("UValueWall", "wall_uvalue"),
        ("UValueRoof", "roof_uvalue"),
        ("UValueFloor", "floor_uvalue"),
        ("UValueWindow", "window_uvalue"),
        ("UvalueDoor", "door_uvalue"),
        ("WallArea", "wall_area"),
        ("RoofArea", "roof_area"),
        ("FloorArea", "floor_area"),
        ("WindowArea", "window_area"),
        ("DoorArea", "door_area"),
        ("NoStoreys", "no_of_storeys"),
        ("CO2Rating", "co2"),
        ("HLCDwelling", "heat_loss_parameter"),
        ("StructureType", "structure_type_category"),
        ("InsulationType", "insulation_category"),
        ("VentilationMethod", "ventilation_method_category"),
        ("FirstWallType_Description", "wall_type_category"),
        ("TotalDeliveredEnergy", "delivered_energy"),
    ]
    .into_iter()
    .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
    .collect()
}

fn default_small_area_mappings() -> BTreeMap<String, String> {
    [
        ("UUID", "building_id"),
        ("cso_small_area", "small_area"),
        ("ED_Name", "electoral_district"),
        ("CountyName2", "countyname"),
        ("Type of rating", "type_of_rating"),
        ("Year of construction", "year_of_construction"),
        ("Dwelling type description", "dwelling_type"),
        ("Energy Rating", "energy_rating"),
        ("Energy Value", "energy_value"),
        ("Ground Floor Area", "ground_floor_area"),
        ("First Floor Area", "first_floor_area"),
        ("Second Floor Area", "second_floor_area"),
        ("Third Floor Area", "third_floor_area"),
        ("Room in Roof Area", "room_in_roof_area"),
        ("Living Area Percent", "living_area_percent"),
        ("HS Main System Efficiency", "main_sh_boiler_efficiency"),
        ("HS Eff Adj Factor", "main_sh_boiler_efficiency_adjustment_factor"),
        ("WH Main System Eff", "main_hw_boiler_efficiency"),
        ("WH Eff Adj Factor", "main_hw_boiler_efficiency_adjustment_factor"),
        ("Main SH Fuel Description", "main_sh_boiler_fuel"),
        ("Suppl SH Fuel Description", "suppl_sh_boiler_fuel"),
        ("Main WH Fuel Description", "main_hw_boiler_fuel"),
        ("Suppl WH Fuel Description", "suppl_hw_boiler_fuel"),
        ("Declared Loss Factor", "declared_loss_factor"),
        ("Thermal Bridging Factor", "thermal_bridging_factor"),
        ("Wall weighted Uvalue", "wall_uvalue"),
        ("Door Weighted Uvalue", "door_uvalue"),
        ("Roof Weighted Uvalue", "roof_uvalue"),
        ("Floor Weighted Uvalue", "floor_uvalue"),
        ("WindowsWeighted Uvalue", "window_uvalue"),
        ("Wall Total Area", "wall_area"),
        ("Door Total Area", "door_area"),
        ("Roof Total Area", "roof_area"),
        ("Floor Total Area", "floor_area"),
        ("Windows Total Area", "window_area"),
        ("No Of Storeys", "no_of_storeys"),
        ("CO2 Value", "co2"),
        ("hlc", "heat_loss_parameter"),
        ("Insulation Type Description", "insulation_category"),
        ("Ventilation Method Description", "ventilation_method_category"),
        ("Most Significant Wall Type", "wall_type_category"),
        ("TotalDeliveredEnergy", "delivered_energy"),
    ]
    .into_iter()
    .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_parses_both_spellings() {
        assert_eq!(
            "countyname".parse::<Granularity>().unwrap(),
            Granularity::Countyname
        );
        assert_eq!(
            "small_area".parse::<Granularity>().unwrap(),
            Granularity::SmallArea
        );
        assert!("postcode".parse::<Granularity>().is_err());
    }

    #[test]
    fn default_bounds_match_the_domain_table() {
        let config = PipelineConfig::default();
        let gfa = config.bounds_for("ground_floor_area").unwrap();
        assert_eq!(gfa.lower, Some(0.0));
        assert_eq!(gfa.upper, Some(1000.0));
        let dlf = config.bounds_for("declared_loss_factor").unwrap();
        assert_eq!(dlf.lower, None);
        assert_eq!(dlf.upper, Some(20.0));
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = PipelineConfig::default();
        let rendered = serde_yaml::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.sample_size, config.sample_size);
        assert_eq!(parsed.bounds, config.bounds);
        assert_eq!(
            parsed.mappings.small_area.get("cso_small_area"),
            Some(&"small_area".to_string())
        );
    }
}
