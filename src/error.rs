use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The geometry source was unreachable or had nothing for the state.
    #[error("no tract geometry available for state {state}: {reason}")]
    DataUnavailable { state: String, reason: String },

    #[error("invalid geometry for tract {geoid}: {reason}")]
    InvalidGeometry { geoid: String, reason: String },

    /// Statistical API unreachable, rate-limited or answering garbage.
    #[error("remote service {endpoint} unavailable: {reason}")]
    RemoteUnavailable { endpoint: String, reason: String },

    #[error("no table row for {} requested tract(s): {}", .0.len(), .0.join(", "))]
    UnknownIdentifier(Vec<String>),

    #[error("tract {0} appears more than once")]
    DuplicateIdentifier(String),

    #[error("malformed tract identifier: {0}")]
    MalformedIdentifier(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data quality checks failed:\n{}", .0.join("\n"))]
    QualityCheck(Vec<String>),

    #[error(transparent)]
    Census(#[from] census::CensusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn remote<E: std::fmt::Display>(endpoint: &str, e: E) -> Self {
        Self::RemoteUnavailable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn invalid_geometry<E: std::fmt::Display>(geoid: &str, e: E) -> Self {
        Self::InvalidGeometry {
            geoid: geoid.to_string(),
            reason: e.to_string(),
        }
    }
}
