use async_trait::async_trait;
use geojson::FeatureCollection;

use crate::config::GeometryConfig;
use crate::error::Result;
use crate::tiger::{GeoJsonFile, TigerWeb, ZippedGeoJson};
use crate::tract::{tracts_from_features, Tract};

/// Gets tract boundary geometry for a state.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Gets the raw GeoJSON features for a state's tracts.
    async fn geojson(&self, state: &str) -> Result<FeatureCollection>;

    /// Gets the state's tracts, parsed and ordered by GEOID.
    async fn tracts(&self, state: &str) -> Result<Vec<Tract>> {
        let features = self.geojson(state).await?;
        tracts_from_features(&features, state)
    }
}

/// Builds the getter named by the configuration.
pub fn from_config(config: &GeometryConfig) -> Result<Box<dyn Getter>> {
    Ok(match config {
        GeometryConfig::TigerWeb {
            url,
            page_size,
            timeout_secs,
        } => Box::new(TigerWeb::new(url.clone(), *page_size, *timeout_secs)?),
        GeometryConfig::File { path } => Box::new(GeoJsonFile::new(path.clone())),
        GeometryConfig::ZipUrl { url, entry } => {
            Box::new(ZippedGeoJson::new(url.clone(), entry.clone()))
        }
    })
}
