//! Tract boundary sources: the Census TIGERweb REST service, local files and
//! zipped GeoJSON downloads.

use std::io::{Read, Seek, Write};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use geojson::FeatureCollection;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::getter::Getter;

/// TIGERweb `Tracts_Blocks` map service, queried as GeoJSON in pages of at
/// most `page_size` features ordered by GEOID until a page comes back empty.
#[derive(Debug)]
pub struct TigerWeb {
    client: reqwest::Client,
    url: String,
    page_size: usize,
}

impl TigerWeb {
    pub fn new(url: impl Into<String>, page_size: usize, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            page_size: page_size.max(1),
        })
    }

    async fn page(&self, state: &str, offset: usize) -> Result<FeatureCollection> {
        let unavailable = |reason: String| Error::DataUnavailable {
            state: state.to_string(),
            reason,
        };
        let query = [
            ("where", format!("STATE='{state}'")),
            ("outFields", "GEOID,NAMELSAD".to_string()),
            ("outSR", "4326".to_string()),
            ("orderByFields", "GEOID".to_string()),
            ("resultOffset", offset.to_string()),
            ("resultRecordCount", self.page_size.to_string()),
            ("returnGeometry", "true".to_string()),
            ("f", "geojson".to_string()),
        ];
        debug!(url = %self.url, offset, "requesting TIGERweb page");
        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| unavailable(format!("{}: {e}", self.url)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("{}: {e}", self.url)))?;
        if !status.is_success() {
            return Err(unavailable(format!("{} returned {status}: {}", self.url, excerpt(&body))));
        }
        // ArcGIS reports query errors as a 200 with an `error` object
        body.parse::<FeatureCollection>()
            .map_err(|e| unavailable(format!("unexpected response ({e}): {}", excerpt(&body))))
    }
}

#[async_trait]
impl Getter for TigerWeb {
    async fn geojson(&self, state: &str) -> Result<FeatureCollection> {
        let mut features = Vec::new();
        // The server may cap a page below `page_size`, so a short page does
        // not mean the end. Only an empty one does.
        loop {
            let page = self.page(state, features.len()).await?;
            if page.features.is_empty() {
                break;
            }
            debug!(fetched = page.features.len(), "TIGERweb page");
            features.extend(page.features);
        }
        info!(state, features = features.len(), "downloaded tract boundaries");
        Ok(features.into_iter().collect())
    }
}

/// A GeoJSON file on disk, or a `.zip` archive holding one.
#[derive(Debug, Clone)]
pub struct GeoJsonFile {
    path: PathBuf,
}

impl GeoJsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Getter for GeoJsonFile {
    async fn geojson(&self, state: &str) -> Result<FeatureCollection> {
        let file = std::fs::File::open(&self.path).map_err(|e| Error::DataUnavailable {
            state: state.to_string(),
            reason: format!("{}: {e}", self.path.display()),
        })?;
        let is_zip = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        let buffer = if is_zip {
            read_zipped_geojson(file, None)?
        } else {
            let mut buffer = String::new();
            std::io::BufReader::new(file).read_to_string(&mut buffer)?;
            buffer
        };
        info!(path = %self.path.display(), "loaded tract boundaries");
        Ok(buffer.parse()?)
    }
}

/// A zipped GeoJSON download, e.g. a state extract published as an archive.
#[derive(Debug, Clone)]
pub struct ZippedGeoJson {
    url: String,
    entry: String,
}

impl ZippedGeoJson {
    pub fn new(url: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            entry: entry.into(),
        }
    }
}

#[async_trait]
impl Getter for ZippedGeoJson {
    async fn geojson(&self, state: &str) -> Result<FeatureCollection> {
        let bytes = reqwest::get(&self.url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::DataUnavailable {
                state: state.to_string(),
                reason: e.to_string(),
            })?
            .bytes()
            .await
            .map_err(|e| Error::DataUnavailable {
                state: state.to_string(),
                reason: e.to_string(),
            })?;
        let mut tmpfile = tempfile::tempfile()?;
        tmpfile.write_all(&bytes)?;
        let buffer = read_zipped_geojson(tmpfile, Some(&self.entry))?;
        Ok(buffer.parse()?)
    }
}

/// Reads `entry` from the archive, or the first `.geojson`/`.json` member
/// when no entry is named.
fn read_zipped_geojson<R: Read + Seek>(reader: R, entry: Option<&str>) -> Result<String> {
    let mut zip = zip::ZipArchive::new(reader)?;
    let name = match entry {
        Some(entry) => entry.to_string(),
        None => zip
            .file_names()
            .filter(|n| n.ends_with(".geojson") || n.ends_with(".json"))
            .min()
            .map(String::from)
            .ok_or(zip::result::ZipError::FileNotFound)?,
    };
    let mut file = zip.by_name(&name)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn excerpt(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tract::tests::square_feature;

    fn sample_collection() -> FeatureCollection {
        vec![
            square_feature("17031670400", -87.654, 41.766, 0.005),
            square_feature("17031670500", -87.640, 41.766, 0.005),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.geojson");
        std::fs::write(&path, geojson::GeoJson::from(sample_collection()).to_string()).unwrap();

        let tracts = GeoJsonFile::new(&path).tracts("17").await.unwrap();
        assert_eq!(tracts.len(), 2);
        assert_eq!(tracts[0].geoid.as_str(), "17031670400");
    }

    #[tokio::test]
    async fn test_zipped_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracts.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        zip.start_file("README.txt", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"tracts").unwrap();
        zip.start_file("tl_2023_17_tract.geojson", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(geojson::GeoJson::from(sample_collection()).to_string().as_bytes())
            .unwrap();
        zip.finish().unwrap();

        let features = GeoJsonFile::new(&path).geojson("17").await.unwrap();
        assert_eq!(features.features.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let err = GeoJsonFile::new("does/not/exist.geojson")
            .geojson("17")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DataUnavailable { ref state, .. } if state == "17"));
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        assert_eq!(excerpt(&body).chars().count(), 200);
        assert_eq!(excerpt("short"), "short");
    }

    #[tokio::test]
    #[ignore = "downloads Illinois tract boundaries from TIGERweb"]
    async fn test_tigerweb_illinois() {
        let tiger = TigerWeb::new(crate::config::TIGERWEB_TRACTS_URL, 1000, 120).unwrap();
        let tracts = tiger.tracts("17").await.unwrap();
        println!("{} Illinois tracts", tracts.len());
        assert!(tracts.len() > 3000);
        assert!(tracts.iter().all(|t| t.geoid.state() == "17"));
    }
}
