//! File adapters for the selection and annotation stages.
//!
//! Every writer goes through [`write_atomically`]: the content lands in
//! `<name>.partial` and is renamed into place once complete, so an aborted
//! run never leaves a truncated file under the final name.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use census::{AmbulatoryDifficulty, TractGeoid};
use geojson::{Feature, FeatureCollection, GeoJson};
use polars::prelude::*;
use tracing::{debug, info};

use crate::annotator::Annotations;
use crate::error::{Error, Result};
use crate::selector::Selection;

pub const GEOID: &str = "GEOID";

pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Writes through `<path>.partial`, renaming on success. On failure the
/// partial file is left behind for inspection.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    create_parent(path)?;
    let partial = partial_path(path);
    let mut file = File::create(&partial)?;
    write(&mut file)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&partial, path)?;
    info!(path = %path.display(), "wrote");
    Ok(())
}

/// Deletes outputs of an earlier run so a failure now cannot be mistaken
/// for success.
pub fn remove_stale(paths: &[PathBuf]) -> Result<()> {
    for path in paths.iter().flat_map(|p| [p.clone(), partial_path(p)]) {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    write_atomically(path, |file| {
        CsvWriter::new(file).finish(df)?;
        Ok(())
    })
}

/// Writes straight to `<path>.partial`, for results that must not be
/// mistaken for a finished run.
pub fn write_csv_partial(path: &Path, df: &mut DataFrame) -> Result<PathBuf> {
    create_parent(path)?;
    let partial = partial_path(path);
    let mut file = File::create(&partial)?;
    CsvWriter::new(&mut file).finish(df)?;
    info!(path = %partial.display(), "wrote");
    Ok(partial)
}

/// One row per selected tract: identifier, distances and centroid.
pub fn selection_dataframe(selection: &Selection) -> Result<DataFrame> {
    let tracts = &selection.tracts;
    let df = DataFrame::new(vec![
        Series::new(
            GEOID,
            tracts.iter().map(|t| t.tract.geoid.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "NAMELSAD",
            tracts.iter().map(|t| t.tract.name.as_deref()).collect::<Vec<_>>(),
        ),
        Series::new(
            "distance_miles",
            tracts.iter().map(|t| t.distance_miles).collect::<Vec<_>>(),
        ),
        Series::new(
            "centroid_distance_miles",
            tracts.iter().map(|t| t.centroid_distance_miles).collect::<Vec<_>>(),
        ),
        Series::new(
            "centroid_lat",
            tracts.iter().map(|t| t.centroid.y()).collect::<Vec<_>>(),
        ),
        Series::new(
            "centroid_lon",
            tracts.iter().map(|t| t.centroid.x()).collect::<Vec<_>>(),
        ),
    ])?;
    Ok(df)
}

/// The selected tracts as GeoJSON features, properties mirroring the CSV.
pub fn selection_geojson(selection: &Selection) -> FeatureCollection {
    selection
        .tracts
        .iter()
        .map(|t| {
            let mut feature = Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &t.tract.geometry,
                ))),
                id: None,
                properties: None,
                foreign_members: None,
            };
            feature.set_property(GEOID, t.tract.geoid.as_str());
            feature.set_property("NAMELSAD", t.tract.name.clone());
            feature.set_property("distance_miles", t.distance_miles);
            feature.set_property("centroid_distance_miles", t.centroid_distance_miles);
            feature.set_property("centroid_lat", t.centroid.y());
            feature.set_property("centroid_lon", t.centroid.x());
            feature
        })
        .collect()
}

pub fn write_geojson(path: &Path, features: FeatureCollection) -> Result<()> {
    let out = GeoJson::from(features).to_string();
    write_atomically(path, |file| {
        file.write_all(out.as_bytes())?;
        Ok(())
    })
}

/// Reads a tract CSV, keeping GEOID as text so leading zeros survive.
pub fn read_tracts_csv(path: &Path) -> Result<DataFrame> {
    let dtypes = Schema::from_iter([Field::new(GEOID, DataType::String)]);
    let df = CsvReader::from_path(path)?
        .has_header(true)
        .with_dtypes(Some(Arc::new(dtypes)))
        .finish()?;
    Ok(df)
}

/// GEOIDs of a tract frame in row order. Rejects blanks, malformed codes and
/// repeats.
pub fn geoids(df: &DataFrame) -> Result<Vec<TractGeoid>> {
    let column = df.column(GEOID)?.str()?;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(column.len());
    for value in column.into_iter() {
        let value = value.ok_or_else(|| Error::MalformedIdentifier("blank GEOID".into()))?;
        let geoid: TractGeoid = value
            .parse()
            .map_err(|e: census::CensusError| Error::MalformedIdentifier(e.to_string()))?;
        if !seen.insert(geoid.clone()) {
            return Err(Error::DuplicateIdentifier(geoid.to_string()));
        }
        out.push(geoid);
    }
    Ok(out)
}

/// Raw table fields per tract, followed by the derived metrics when given.
pub fn annotation_dataframe(
    annotations: &Annotations,
    variables: &[String],
    metrics: Option<&[AmbulatoryDifficulty]>,
) -> Result<DataFrame> {
    let rows: Vec<_> = annotations.values().collect();
    let mut columns = vec![
        Series::new(GEOID, rows.iter().map(|r| r.geoid.as_str()).collect::<Vec<_>>()),
        Series::new(
            "NAME",
            rows.iter().map(|r| r.name.as_deref()).collect::<Vec<_>>(),
        ),
    ];
    for variable in variables {
        let values: Vec<Option<i64>> = rows.iter().map(|r| r.get(variable)).collect();
        columns.push(Series::new(variable, values));
    }

    if let Some(metrics) = metrics {
        if metrics.len() != rows.len()
            || metrics.iter().zip(&rows).any(|(m, r)| m.geoid != r.geoid)
        {
            return Err(Error::Config(
                "derived metrics do not line up with the table rows".into(),
            ));
        }
        let ints = |name: &str, f: fn(&AmbulatoryDifficulty) -> i64| {
            Series::new(name, metrics.iter().map(f).collect::<Vec<_>>())
        };
        let floats = |name: &str, f: fn(&AmbulatoryDifficulty) -> f64| {
            Series::new(name, metrics.iter().map(f).collect::<Vec<_>>())
        };
        columns.extend([
            ints("total_pop_5plus", |m| m.total_pop_5plus),
            ints("total_amb_diff", |m| m.total_amb_diff),
            floats("total_amb_diff_pct", |m| m.total_amb_diff_pct),
            ints("pop_65plus", |m| m.pop_65plus),
            ints("pop_65plus_amb_diff", |m| m.pop_65plus_amb_diff),
            floats("pop_65plus_amb_diff_pct", |m| m.pop_65plus_amb_diff_pct),
        ]);
    }
    Ok(DataFrame::new(columns)?)
}

/// Left-joins the annotation columns onto the tract rows. Every tract must
/// match exactly one annotation row.
pub fn join_annotations(tracts: &DataFrame, annotations: &DataFrame) -> Result<DataFrame> {
    let wanted = geoids(tracts)?;
    let available: HashSet<TractGeoid> = geoids(annotations)?.into_iter().collect();
    let missing: Vec<String> = wanted
        .iter()
        .filter(|g| !available.contains(*g))
        .map(|g| g.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::UnknownIdentifier(missing));
    }

    let joined = tracts.join(annotations, [GEOID], [GEOID], JoinType::Left.into())?;
    debug_assert_eq!(joined.height(), tracts.height());
    Ok(joined)
}
