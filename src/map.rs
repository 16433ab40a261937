//! Leaflet map of the selected tracts and the search radius.

use std::io::Write;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson};

use crate::error::Result;
use crate::output::write_atomically;
use crate::selector::{Selection, METRES_PER_MILE};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const center = __CENTER__;
const tracts = __TRACTS__;
const map = L.map('map').setView(center, 14);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
const layer = L.geoJSON(tracts, {
  style: { color: '#3366cc', weight: 1, fillOpacity: 0.15 },
  onEachFeature: (f, l) => l.bindPopup(
    `${f.properties.NAMELSAD ?? ''}<br>GEOID ${f.properties.GEOID}<br>` +
    `${f.properties.distance_miles.toFixed(2)} mi`)
}).addTo(map);
L.circle(center, { radius: __RADIUS_M__, color: '#cc3333', fill: false }).addTo(map);
L.marker(center).addTo(map).bindPopup(__LABEL__);
if (layer.getLayers().length) map.fitBounds(layer.getBounds());
</script>
</body>
</html>
"#;

pub fn render(selection: &Selection, features: &FeatureCollection) -> String {
    let reference = &selection.reference;
    let title = format!(
        "{} tracts within {} mi of {}",
        selection.len(),
        selection.radius_miles,
        reference.label
    );
    TEMPLATE
        .replace("__TITLE__", &escape_html(&title))
        .replace("__CENTER__", &format!("[{}, {}]", reference.lat, reference.lon))
        .replace(
            "__RADIUS_M__",
            &(selection.radius_miles * METRES_PER_MILE).to_string(),
        )
        .replace("__LABEL__", &serde_json::Value::from(reference.label.as_str()).to_string())
        .replace("__TRACTS__", &GeoJson::from(features.clone()).to_string())
}

pub fn write_map(path: &Path, selection: &Selection, features: &FeatureCollection) -> Result<()> {
    let html = render(selection, features);
    write_atomically(path, |file| {
        file.write_all(html.as_bytes())?;
        Ok(())
    })
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
