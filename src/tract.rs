use std::collections::BTreeMap;

use census::TractGeoid;
use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection};
use tracing::debug;

use crate::error::{Error, Result};

/// A Census tract boundary as loaded from a geometry source.
#[derive(Clone, Debug, PartialEq)]
pub struct Tract {
    pub geoid: TractGeoid,
    // NAMELSAD, e.g. "Census Tract 6704"
    pub name: Option<String>,
    /// WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
}

impl Tract {
    /// Reads a GeoJSON feature carrying a `GEOID` property and a (multi)polygon.
    pub fn from_feature(feature: &Feature) -> Result<Self> {
        let geoid = match feature.property("GEOID") {
            Some(serde_json::Value::String(s)) => s.clone(),
            // Some exports store GEOID as a number, which drops the leading zero
            Some(serde_json::Value::Number(n)) if n.is_u64() => {
                format!("{:011}", n.as_u64().unwrap_or_default())
            }
            Some(other) => {
                return Err(Error::MalformedIdentifier(format!("GEOID property {other}")))
            }
            None => return Err(Error::MalformedIdentifier("feature without GEOID".into())),
        };
        let geoid: TractGeoid = geoid
            .parse()
            .map_err(|e: census::CensusError| Error::MalformedIdentifier(e.to_string()))?;

        let name = feature
            .property("NAMELSAD")
            .and_then(|v| v.as_str())
            .map(String::from);

        let value = feature
            .geometry
            .as_ref()
            .ok_or_else(|| Error::invalid_geometry(geoid.as_str(), "feature has no geometry"))?
            .value
            .clone();
        let geometry = match Geometry::<f64>::try_from(value)
            .map_err(|e| Error::invalid_geometry(geoid.as_str(), e))?
        {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            Geometry::MultiPolygon(multi) => multi,
            other => {
                return Err(Error::invalid_geometry(
                    geoid.as_str(),
                    format!("expected a polygon, found {}", geometry_kind(&other)),
                ))
            }
        };
        if geometry.0.iter().all(|p| p.exterior().0.is_empty()) {
            return Err(Error::invalid_geometry(geoid.as_str(), "empty polygon"));
        }

        Ok(Self {
            geoid,
            name,
            geometry,
        })
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Parses every feature belonging to `state`, merging features that share a
/// GEOID. Result is ordered by GEOID.
pub fn tracts_from_features(features: &FeatureCollection, state: &str) -> Result<Vec<Tract>> {
    let mut tracts = Vec::with_capacity(features.features.len());
    for feature in &features.features {
        let tract = Tract::from_feature(feature)?;
        if tract.geoid.state() != state {
            debug!(geoid = %tract.geoid, state, "skipping tract outside state");
            continue;
        }
        tracts.push(tract);
    }
    if tracts.is_empty() {
        return Err(Error::DataUnavailable {
            state: state.to_string(),
            reason: format!("none of {} features belong to the state", features.features.len()),
        });
    }
    Ok(merge_duplicates(tracts))
}

/// Orders tracts by GEOID, folding the polygons of repeated GEOIDs into one
/// multipolygon.
pub fn merge_duplicates(tracts: impl IntoIterator<Item = Tract>) -> Vec<Tract> {
    let mut by_geoid: BTreeMap<TractGeoid, Tract> = BTreeMap::new();
    for tract in tracts {
        match by_geoid.get_mut(&tract.geoid) {
            Some(existing) => {
                debug!(geoid = %tract.geoid, "merging split tract geometry");
                existing.geometry.0.extend(tract.geometry.0);
                if existing.name.is_none() {
                    existing.name = tract.name;
                }
            }
            None => {
                by_geoid.insert(tract.geoid.clone(), tract);
            }
        }
    }
    by_geoid.into_values().collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Axis-aligned square tract feature centred on (lon, lat).
    pub(crate) fn square_feature(geoid: &str, lon: f64, lat: f64, half: f64) -> Feature {
        let ring = vec![
            vec![lon - half, lat - half],
            vec![lon + half, lat - half],
            vec![lon + half, lat + half],
            vec![lon - half, lat + half],
            vec![lon - half, lat - half],
        ];
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Polygon(vec![ring]))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("GEOID", geoid);
        feature.set_property("NAMELSAD", format!("Census Tract {}", &geoid[5..]));
        feature
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        features.into_iter().collect()
    }

    #[test]
    fn test_from_feature() {
        let tract = Tract::from_feature(&square_feature("17031670400", -87.65, 41.77, 0.01)).unwrap();
        assert_eq!(tract.geoid.as_str(), "17031670400");
        assert_eq!(tract.name.as_deref(), Some("Census Tract 670400"));
        assert_eq!(tract.geometry.0.len(), 1);
    }

    #[test]
    fn test_numeric_geoid_is_padded() {
        let mut feature = square_feature("01001020100", -86.5, 32.5, 0.01);
        feature.set_property("GEOID", json!(1001020100u64));
        let tract = Tract::from_feature(&feature).unwrap();
        assert_eq!(tract.geoid.as_str(), "01001020100");
    }

    #[test]
    fn test_rejects_non_polygon() {
        let mut feature = square_feature("17031670400", -87.65, 41.77, 0.01);
        feature.geometry = Some(geojson::Geometry::new(geojson::Value::Point(vec![-87.65, 41.77])));
        let err = Tract::from_feature(&feature).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { ref geoid, .. } if geoid == "17031670400"));
    }

    #[test]
    fn test_rejects_missing_geometry() {
        let mut feature = square_feature("17031670400", -87.65, 41.77, 0.01);
        feature.geometry = None;
        assert!(matches!(
            Tract::from_feature(&feature),
            Err(Error::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_geoid() {
        let feature = square_feature("1703167040X", -87.65, 41.77, 0.01);
        assert!(matches!(
            Tract::from_feature(&feature),
            Err(Error::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_filters_state_and_merges_duplicates() {
        let features = collection(vec![
            square_feature("17031670500", -87.64, 41.77, 0.01),
            square_feature("18089010100", -87.45, 41.60, 0.01),
            square_feature("17031670400", -87.65, 41.77, 0.01),
            square_feature("17031670400", -87.66, 41.77, 0.005),
        ]);
        let tracts = tracts_from_features(&features, "17").unwrap();
        let ids: Vec<_> = tracts.iter().map(|t| t.geoid.as_str()).collect();
        assert_eq!(ids, ["17031670400", "17031670500"]);
        assert_eq!(tracts[0].geometry.0.len(), 2);
    }

    #[test]
    fn test_empty_state_is_unavailable() {
        let features = collection(vec![square_feature("18089010100", -87.45, 41.60, 0.01)]);
        assert!(matches!(
            tracts_from_features(&features, "17"),
            Err(Error::DataUnavailable { .. })
        ));
        assert!(matches!(
            tracts_from_features(&collection(vec![]), "17"),
            Err(Error::DataUnavailable { .. })
        ));
    }
}
