use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CensusError {
    #[error("malformed tract GEOID {0:?}: expected 11 digits (state + county + tract)")]
    MalformedGeoid(String),

    #[error("tract {geoid}: variable {variable} missing from the table row")]
    MissingVariable { geoid: String, variable: String },
}

/// Census tract identifier: 2-digit state, 3-digit county and 6-digit tract
/// FIPS codes concatenated.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TractGeoid(String);

impl TractGeoid {
    pub const LEN: usize = 11;

    pub fn state(&self) -> &str {
        &self.0[..2]
    }

    pub fn county(&self) -> &str {
        &self.0[2..5]
    }

    pub fn tract(&self) -> &str {
        &self.0[5..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the GEOID from the separate columns the Census Data API returns.
    pub fn from_parts(state: &str, county: &str, tract: &str) -> Result<Self, CensusError> {
        format!("{state}{county}{tract}").parse()
    }
}

impl FromStr for TractGeoid {
    type Err = CensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(CensusError::MalformedGeoid(s.to_string()))
        }
    }
}

impl TryFrom<String> for TractGeoid {
    type Error = CensusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TractGeoid> for String {
    fn from(geoid: TractGeoid) -> Self {
        geoid.0
    }
}

impl fmt::Display for TractGeoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ACS table B18105: ambulatory difficulty by sex by age.
/// See https://data.census.gov/table/ACSDT5Y2023.B18105 for the cell layout.
pub const AMBULATORY_TABLE: &str = "B18105";

// Civilian noninstitutionalized population 5 years and over
pub const TOTAL_POP_5PLUS: &str = "B18105_001E";

// With an ambulatory difficulty, male 5-17, 18-34, 35-64, 65-74, 75+ then female
pub const WITH_DIFFICULTY: [&str; 10] = [
    "B18105_004E",
    "B18105_007E",
    "B18105_010E",
    "B18105_013E",
    "B18105_016E",
    "B18105_020E",
    "B18105_023E",
    "B18105_026E",
    "B18105_029E",
    "B18105_032E",
];

// Male 65-74, male 75+, female 65-74, female 75+ totals
pub const POP_65PLUS: [&str; 4] = ["B18105_012E", "B18105_015E", "B18105_028E", "B18105_031E"];

// With an ambulatory difficulty, 65+ only
pub const WITH_DIFFICULTY_65PLUS: [&str; 4] =
    ["B18105_013E", "B18105_016E", "B18105_029E", "B18105_032E"];

/// Every B18105 variable the metrics below need, in request order.
pub fn ambulatory_variables() -> Vec<String> {
    std::iter::once(TOTAL_POP_5PLUS)
        .chain(WITH_DIFFICULTY)
        .chain(POP_65PLUS)
        .map(String::from)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmbulatoryDifficulty {
    pub geoid: TractGeoid,
    pub total_pop_5plus: i64,
    pub total_amb_diff: i64,
    pub total_amb_diff_pct: f64,
    pub pop_65plus: i64,
    pub pop_65plus_amb_diff: i64,
    pub pop_65plus_amb_diff_pct: f64,
}

impl AmbulatoryDifficulty {
    /// Derives the metrics from raw table cells keyed by variable name. A
    /// null cell counts as missing.
    pub fn from_estimates(
        geoid: TractGeoid,
        estimates: &HashMap<String, Option<i64>>,
    ) -> Result<Self, CensusError> {
        let get = |variable: &str| -> Result<i64, CensusError> {
            estimates
                .get(variable)
                .copied()
                .flatten()
                .ok_or_else(|| CensusError::MissingVariable {
                    geoid: geoid.to_string(),
                    variable: variable.to_string(),
                })
        };
        let sum = |variables: &[&str]| -> Result<i64, CensusError> {
            variables.iter().map(|&v| get(v)).sum()
        };

        let total_pop_5plus = get(TOTAL_POP_5PLUS)?;
        let total_amb_diff = sum(&WITH_DIFFICULTY)?;
        let pop_65plus = sum(&POP_65PLUS)?;
        let pop_65plus_amb_diff = sum(&WITH_DIFFICULTY_65PLUS)?;

        Ok(Self {
            total_amb_diff_pct: percentage(total_amb_diff, total_pop_5plus),
            pop_65plus_amb_diff_pct: percentage(pop_65plus_amb_diff, pop_65plus),
            geoid,
            total_pop_5plus,
            total_amb_diff,
            pop_65plus,
            pop_65plus_amb_diff,
        })
    }

    /// Sanity checks on the derived counts. Empty when the row is plausible.
    pub fn quality_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (name, value) in [
            ("total_pop_5plus", self.total_pop_5plus),
            ("total_amb_diff", self.total_amb_diff),
            ("pop_65plus", self.pop_65plus),
            ("pop_65plus_amb_diff", self.pop_65plus_amb_diff),
        ] {
            if value < 0 {
                issues.push(format!("{}: negative value in {name} ({value})", self.geoid));
            }
        }
        if self.total_amb_diff > self.total_pop_5plus {
            issues.push(format!(
                "{}: total ambulatory difficulty exceeds total population",
                self.geoid
            ));
        }
        if self.pop_65plus_amb_diff > self.pop_65plus {
            issues.push(format!(
                "{}: 65+ ambulatory difficulty exceeds 65+ population",
                self.geoid
            ));
        }
        if self.pop_65plus > self.total_pop_5plus {
            issues.push(format!("{}: 65+ population exceeds total population", self.geoid));
        }
        if self.total_amb_diff_pct > 100.0 {
            issues.push(format!(
                "{}: total ambulatory difficulty percentage exceeds 100%",
                self.geoid
            ));
        }
        if self.pop_65plus_amb_diff_pct > 100.0 {
            issues.push(format!(
                "{}: 65+ ambulatory difficulty percentage exceeds 100%",
                self.geoid
            ));
        }
        issues
    }
}

// Rounded to 2 decimals; an empty denominator reads as 0%
fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}
