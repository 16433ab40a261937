//! Radius selection of tracts around a reference point.
//!
//! A tract is "within" the radius according to a [`DistanceConvention`]:
//!
//! - [`DistanceConvention::Boundary`] (default) measures from the reference
//!   point to the nearest point of the tract polygon, and is zero when the
//!   point lies inside the tract. A tract is selected exactly when its
//!   polygon intersects the radius circle.
//! - [`DistanceConvention::Centroid`] measures the great-circle distance to
//!   the tract centroid.
//!
//! Boundary distances are computed in a local equirectangular projection
//! centred on the reference point. Over a few miles the distortion is far
//! below the precision of the tract boundaries themselves.

use geo::{
    Centroid, Coord, EuclideanDistance, HaversineDistance, Intersects, MapCoords, MultiPolygon,
    Point,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tract::{merge_duplicates, Tract};

pub const METRES_PER_MILE: f64 = 1609.344;

// Same radius geo uses for haversine, so both conventions agree on a meridian
const EARTH_RADIUS_METRES: f64 = 6_371_008.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

impl ReferencePoint {
    pub fn new(label: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            label: label.into(),
            lat,
            lon,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Maps lon/lat to metres east/north of this point.
    fn projection(&self) -> impl Fn(Coord<f64>) -> Coord<f64> + Copy {
        let (lat0, lon0) = (self.lat, self.lon);
        let scale = lat0.to_radians().cos();
        move |c: Coord<f64>| {
            let mut dlon = c.x - lon0;
            if dlon > 180.0 {
                dlon -= 360.0;
            } else if dlon < -180.0 {
                dlon += 360.0;
            }
            Coord {
                x: dlon.to_radians() * scale * EARTH_RADIUS_METRES,
                y: (c.y - lat0).to_radians() * EARTH_RADIUS_METRES,
            }
        }
    }
}

#[derive(
    Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DistanceConvention {
    #[default]
    Boundary,
    Centroid,
}

/// Distances from one tract to the reference point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub boundary_miles: f64,
    pub centroid_miles: f64,
    pub centroid: Point<f64>,
}

impl Measurement {
    pub fn distance(&self, convention: DistanceConvention) -> f64 {
        match convention {
            DistanceConvention::Boundary => self.boundary_miles,
            DistanceConvention::Centroid => self.centroid_miles,
        }
    }
}

pub fn measure(tract: &Tract, reference: &ReferencePoint) -> Result<Measurement> {
    let centroid = tract
        .geometry
        .centroid()
        .ok_or_else(|| Error::invalid_geometry(tract.geoid.as_str(), "no centroid"))?;
    let centroid_miles = reference.point().haversine_distance(&centroid) / METRES_PER_MILE;
    let boundary_miles = boundary_distance(&tract.geometry, reference) / METRES_PER_MILE;

    if !centroid_miles.is_finite() || !boundary_miles.is_finite() {
        return Err(Error::invalid_geometry(
            tract.geoid.as_str(),
            "coordinates produce a non-finite distance",
        ));
    }
    Ok(Measurement {
        boundary_miles,
        centroid_miles,
        centroid,
    })
}

// Metres from the reference point to the nearest point of the polygon
fn boundary_distance(geometry: &MultiPolygon<f64>, reference: &ReferencePoint) -> f64 {
    let projected = geometry.map_coords(reference.projection());
    let origin = Point::new(0.0, 0.0);
    if projected.intersects(&origin) {
        0.0
    } else {
        origin.euclidean_distance(&projected)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectedTract {
    pub tract: Tract,
    /// Distance under the selection's convention.
    pub distance_miles: f64,
    pub centroid_distance_miles: f64,
    pub centroid: Point<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub reference: ReferencePoint,
    pub radius_miles: f64,
    pub convention: DistanceConvention,
    /// Ordered by GEOID, one entry per GEOID.
    pub tracts: Vec<SelectedTract>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    pub fn geoids(&self) -> impl Iterator<Item = &census::TractGeoid> {
        self.tracts.iter().map(|t| &t.tract.geoid)
    }
}

/// Keeps the tracts whose distance to `reference` is at most `radius_miles`.
pub fn select_tracts(
    tracts: Vec<Tract>,
    reference: &ReferencePoint,
    radius_miles: f64,
    convention: DistanceConvention,
) -> Result<Selection> {
    if !radius_miles.is_finite() || radius_miles <= 0.0 {
        return Err(Error::Config(format!(
            "radius must be a positive distance, got {radius_miles}"
        )));
    }

    let candidates = merge_duplicates(tracts);
    let total = candidates.len();
    let mut selected = Vec::new();
    for tract in candidates {
        let m = measure(&tract, reference)?;
        let distance = m.distance(convention);
        if distance <= radius_miles {
            debug!(geoid = %tract.geoid, distance, "selected");
            selected.push(SelectedTract {
                tract,
                distance_miles: distance,
                centroid_distance_miles: m.centroid_miles,
                centroid: m.centroid,
            });
        }
    }
    info!(
        selected = selected.len(),
        total,
        radius_miles,
        ?convention,
        "tract selection complete"
    );

    Ok(Selection {
        reference: reference.clone(),
        radius_miles,
        convention,
        tracts: selected,
    })
}
