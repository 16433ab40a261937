//! Run configuration.
//!
//! Every constant the two stages depend on (the address of interest, the
//! radius, the state, the ACS table) lives here so a different address or
//! table can be substituted without touching the selection or annotation
//! logic. Values come from [`Config::default`], optionally overlaid by a YAML
//! file, then by command-line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::selector::{DistanceConvention, ReferencePoint};

/// W. 71st St & S. Racine Ave, Chicago.
pub const DEFAULT_LATITUDE: f64 = 41.766;
pub const DEFAULT_LONGITUDE: f64 = -87.654;
pub const DEFAULT_RADIUS_MILES: f64 = 1.0;
/// Illinois.
pub const DEFAULT_STATE_FIPS: &str = "17";

pub const TIGERWEB_TRACTS_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/Tracts_Blocks/MapServer/0/query";
pub const CENSUS_API_BASE: &str = "https://api.census.gov/data";

// The Census Data API accepts at most 50 variables per call, NAME included
pub const MAX_VARIABLES: usize = 49;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reference: ReferencePoint,
    pub radius_miles: f64,
    pub convention: DistanceConvention,
    /// State FIPS code the tracts are loaded for.
    pub state: String,
    pub geometry: GeometryConfig,
    pub acs: AcsConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference: ReferencePoint {
                label: "W. 71st St & S. Racine Ave, Chicago".to_string(),
                lat: DEFAULT_LATITUDE,
                lon: DEFAULT_LONGITUDE,
            },
            radius_miles: DEFAULT_RADIUS_MILES,
            convention: DistanceConvention::default(),
            state: DEFAULT_STATE_FIPS.to_string(),
            geometry: GeometryConfig::default(),
            acs: AcsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Where tract boundaries come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GeometryConfig {
    /// Census TIGERweb ArcGIS REST service, queried page by page.
    TigerWeb {
        url: String,
        #[serde(default = "default_page_size")]
        page_size: usize,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// A local `.geojson` file, or a `.zip` holding one.
    File { path: PathBuf },
    /// A zipped GeoJSON download.
    ZipUrl { url: String, entry: String },
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self::TigerWeb {
            url: TIGERWEB_TRACTS_URL.to_string(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_page_size() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcsConfig {
    pub base_url: String,
    pub year: u16,
    pub dataset: String,
    pub table: String,
    /// Table cells to request, each `{table}_...`. Left empty, the table's
    /// built-in list is used (only B18105 has one).
    pub variables: Vec<String>,
    /// Falls back to `CENSUS_API_KEY`. The API works without a key at low volume.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AcsConfig {
    fn default() -> Self {
        Self {
            base_url: CENSUS_API_BASE.to_string(),
            year: 2023,
            dataset: "acs/acs5".to_string(),
            table: census::AMBULATORY_TABLE.to_string(),
            variables: Vec::new(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AcsConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("CENSUS_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// The variables to request: the configured list, or the table's
    /// built-in one when none is configured.
    pub fn resolved_variables(&self) -> Result<Vec<String>> {
        if !self.variables.is_empty() {
            return Ok(self.variables.clone());
        }
        if self.table == census::AMBULATORY_TABLE {
            Ok(census::ambulatory_variables())
        } else {
            Err(Error::Config(format!(
                "table {} has no built-in variable list, set acs.variables",
                self.table
            )))
        }
    }

    /// Whether the ambulatory-difficulty metrics can be derived, i.e. the
    /// table is B18105 and every cell they need is requested.
    pub fn derives_ambulatory_metrics(&self) -> bool {
        self.table == census::AMBULATORY_TABLE
            && self.resolved_variables().is_ok_and(|requested| {
                census::ambulatory_variables()
                    .iter()
                    .all(|v| requested.contains(v))
            })
    }

    pub fn validate(&self) -> Result<()> {
        let variables = self.resolved_variables()?;
        if variables.is_empty() || variables.len() > MAX_VARIABLES {
            return Err(Error::Config(format!(
                "between 1 and {MAX_VARIABLES} ACS variables can be requested, got {}",
                variables.len()
            )));
        }
        let prefix = format!("{}_", self.table);
        let foreign: Vec<&str> = variables
            .iter()
            .filter(|v| !v.starts_with(&prefix))
            .map(String::as_str)
            .collect();
        if !foreign.is_empty() {
            return Err(Error::Config(format!(
                "variables {} do not belong to table {}",
                foreign.join(", "),
                self.table
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("ACS timeout must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// File stem shared by the selection outputs.
    pub stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("generated"),
            stem: "tracts_within_1mile".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn tracts_csv(&self) -> PathBuf {
        self.dir.join(format!("{}.csv", self.stem))
    }

    pub fn tracts_geojson(&self) -> PathBuf {
        self.dir.join(format!("{}.geojson", self.stem))
    }

    pub fn map_html(&self) -> PathBuf {
        self.dir.join(format!("{}.html", self.stem))
    }

    pub fn annotated_csv(&self) -> PathBuf {
        self.dir.join(format!("{}_annotated.csv", self.stem))
    }
}

impl Config {
    /// Reads a YAML config. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// Default config, or the YAML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ReferencePoint { lat, lon, .. } = self.reference;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::Config(format!(
                "reference point ({lat}, {lon}) is not a valid latitude/longitude"
            )));
        }
        if !self.radius_miles.is_finite() || self.radius_miles <= 0.0 {
            return Err(Error::Config(format!(
                "radius must be a positive distance, got {}",
                self.radius_miles
            )));
        }
        if self.state.len() != 2 || !self.state.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Config(format!(
                "state must be a 2-digit FIPS code, got {:?}",
                self.state
            )));
        }
        if let GeometryConfig::TigerWeb {
            page_size,
            timeout_secs,
            ..
        } = self.geometry
        {
            if page_size == 0 || timeout_secs == 0 {
                return Err(Error::Config(
                    "TIGERweb page size and timeout must be positive".into(),
                ));
            }
        }
        self.acs.validate()
    }
}
