//! Command-line plumbing shared by the two binaries.

use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, GeometryConfig};
use crate::error::Result;
use crate::selector::DistanceConvention;

#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// YAML configuration file. Flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory the output files are written to.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Reference point latitude.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Reference point longitude.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    pub radius_miles: Option<f64>,

    /// State FIPS code, e.g. 17 for Illinois.
    #[arg(long)]
    pub state: Option<String>,

    #[arg(long, value_enum)]
    pub convention: Option<DistanceConvention>,

    /// Read tract boundaries from a local .geojson or .zip instead of TIGERweb.
    #[arg(long)]
    pub geometry_file: Option<PathBuf>,
}

impl CommonArgs {
    /// Loads the config file (or defaults), applies the flags and validates.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(lat) = self.lat {
            config.reference.lat = lat;
        }
        if let Some(lon) = self.lon {
            config.reference.lon = lon;
        }
        if self.lat.is_some() || self.lon.is_some() {
            config.reference.label = format!("({}, {})", config.reference.lat, config.reference.lon);
        }
        if let Some(radius) = self.radius_miles {
            config.radius_miles = radius;
        }
        if let Some(state) = &self.state {
            config.state = state.clone();
        }
        if let Some(convention) = self.convention {
            config.convention = convention;
        }
        if let Some(path) = &self.geometry_file {
            config.geometry = GeometryConfig::File { path: path.clone() };
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// `RUST_LOG` wins; otherwise the `-v` count picks the level.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match self.verbose {
            0 => EnvFilter::new("warn,tractgetter=info"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
