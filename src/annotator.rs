//! ACS table lookups for a set of tracts.
//!
//! The Census Data API answers tract queries per county, so the requested
//! GEOIDs are grouped by (state, county) and each group is fetched with one
//! `for=tract:*` call. Rows come back as a JSON array of string arrays whose
//! first row is the header. Values pass through unchanged: no margin of
//! error handling, no aggregation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use census::{AmbulatoryDifficulty, TractGeoid};
use tracing::{debug, info};

use crate::config::AcsConfig;
use crate::error::{Error, Result};

/// One tract's row of the requested table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub geoid: TractGeoid,
    pub name: Option<String>,
    /// Requested variables in request order. `None` where the API reports null.
    pub fields: Vec<(String, Option<i64>)>,
}

impl TableRow {
    pub fn get(&self, variable: &str) -> Option<i64> {
        self.fields
            .iter()
            .find(|(name, _)| name == variable)
            .and_then(|(_, value)| *value)
    }

    pub fn estimates(&self) -> HashMap<String, Option<i64>> {
        self.fields.iter().cloned().collect()
    }
}

pub type Annotations = BTreeMap<TractGeoid, TableRow>;

#[derive(Debug)]
pub struct AcsClient {
    client: reqwest::Client,
    endpoint: String,
    variables: Vec<String>,
    api_key: Option<String>,
}

impl AcsClient {
    pub fn new(config: &AcsConfig) -> Result<Self> {
        config.validate()?;
        let variables = config.resolved_variables()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!(
            "{}/{}/{}",
            config.base_url.trim_end_matches('/'),
            config.year,
            config.dataset.trim_matches('/')
        );
        Ok(Self {
            client,
            endpoint,
            variables,
            api_key: config.api_key(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Fetches the table for every GEOID. Fails with
    /// [`Error::UnknownIdentifier`] listing each GEOID the API had no row for.
    pub async fn fetch(&self, geoids: &[TractGeoid]) -> Result<Annotations> {
        let mut counties: BTreeMap<(&str, &str), BTreeSet<&TractGeoid>> = BTreeMap::new();
        for geoid in geoids {
            counties
                .entry((geoid.state(), geoid.county()))
                .or_default()
                .insert(geoid);
        }

        let mut annotations = Annotations::new();
        for ((state, county), wanted) in &counties {
            info!(state, county, tracts = wanted.len(), "fetching ACS rows");
            for row in self.fetch_county(state, county).await? {
                if !wanted.contains(&row.geoid) {
                    continue;
                }
                if annotations.contains_key(&row.geoid) {
                    return Err(Error::DuplicateIdentifier(row.geoid.to_string()));
                }
                annotations.insert(row.geoid.clone(), row);
            }
        }

        let missing: Vec<String> = counties
            .values()
            .flatten()
            .filter(|g| !annotations.contains_key(**g))
            .map(|g| g.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::UnknownIdentifier(missing));
        }
        info!(tracts = annotations.len(), "fetched ACS rows");
        Ok(annotations)
    }

    async fn fetch_county(&self, state: &str, county: &str) -> Result<Vec<TableRow>> {
        let mut query = vec![
            ("get", format!("NAME,{}", self.variables.join(","))),
            ("for", "tract:*".to_string()),
            ("in", format!("state:{state}")),
            ("in", format!("county:{county}")),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        debug!(endpoint = %self.endpoint, state, county, "GET");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::remote(&self.endpoint, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::remote(&self.endpoint, e))?;
        if !status.is_success() {
            return Err(Error::remote(
                &self.endpoint,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }
        // 204 / empty body: the query matched nothing
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let table: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)
            .map_err(|e| Error::remote(&self.endpoint, format!("malformed response: {e}")))?;
        parse_table(&self.endpoint, &self.variables, table)
    }
}

/// Derives the B18105 ambulatory-difficulty metrics for every row, in
/// GEOID order.
pub fn ambulatory_metrics(annotations: &Annotations) -> Result<Vec<AmbulatoryDifficulty>> {
    annotations
        .values()
        .map(|row| Ok(AmbulatoryDifficulty::from_estimates(row.geoid.clone(), &row.estimates())?))
        .collect()
}

pub fn check_quality(metrics: &[AmbulatoryDifficulty]) -> Result<()> {
    let issues: Vec<String> = metrics.iter().flat_map(|m| m.quality_issues()).collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::QualityCheck(issues))
    }
}

fn parse_table(
    endpoint: &str,
    variables: &[String],
    table: Vec<Vec<serde_json::Value>>,
) -> Result<Vec<TableRow>> {
    let mut rows = table.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = header.iter().map(|h| h.as_str().unwrap_or_default()).collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| Error::remote(endpoint, format!("response has no {name} column")))
    };
    let (state, county, tract) = (column("state")?, column("county")?, column("tract")?);
    let name = header.iter().position(|h| *h == "NAME");
    let variable_columns = variables
        .iter()
        .map(|v| column(v.as_str()))
        .collect::<Result<Vec<_>>>()?;

    rows.map(|row| -> Result<TableRow> {
        if row.len() != header.len() {
            return Err(Error::remote(
                endpoint,
                format!("row has {} cells, header has {}", row.len(), header.len()),
            ));
        }
        let text = |i: usize| cell_text(&row[i]);
        let geoid = TractGeoid::from_parts(&text(state), &text(county), &text(tract))
            .map_err(|e| Error::remote(endpoint, e))?;
        let fields = variables
            .iter()
            .zip(&variable_columns)
            .map(|(variable, &i)| -> Result<(String, Option<i64>)> {
                let value = cell_value(&row[i]).map_err(|cell| {
                    Error::remote(
                        endpoint,
                        format!("{geoid}: {variable} is not a number: {cell}"),
                    )
                })?;
                Ok((variable.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TableRow {
            name: name.map(text),
            geoid,
            fields,
        })
    })
    .collect()
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Estimates are integers, sent as strings or numbers
fn cell_value(cell: &serde_json::Value) -> std::result::Result<Option<i64>, String> {
    match cell {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| n.to_string()),
        serde_json::Value::String(s) => s.trim().parse().map(Some).map_err(|_| s.clone()),
        other => Err(other.to_string()),
    }
}
