use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use census::AmbulatoryDifficulty;
use clap::Parser;
use tracing::{error, info};

use tractgetter::annotator::{self, AcsClient};
use tractgetter::cli::CommonArgs;
use tractgetter::output;

/// Annotates the selected tracts with an ACS table from the Census Data API.
#[derive(Parser, Debug)]
#[command(name = "annotate-tracts", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Tract CSV written by select-tracts. Defaults to the configured output.
    #[arg(long)]
    input: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.common.init_tracing();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.common.config()?;
    let input = cli.input.clone().unwrap_or_else(|| config.output.tracts_csv());
    let output_path = config.output.annotated_csv();
    output::remove_stale(&[output_path.clone()])?;

    println!("Reading {}...", input.display());
    let tracts = output::read_tracts_csv(&input)?;
    let geoids = output::geoids(&tracts)?;
    if geoids.is_empty() {
        bail!("{} lists no tracts", input.display());
    }
    println!("Found {} tracts", geoids.len());

    println!("\nFetching Census {} data...", config.acs.table);
    let client = AcsClient::new(&config.acs)?;
    info!(endpoint = client.endpoint(), "querying ACS");
    let annotations = client.fetch(&geoids).await?;

    let metrics = if config.acs.derives_ambulatory_metrics() {
        Some(annotator::ambulatory_metrics(&annotations)?)
    } else {
        info!(table = %config.acs.table, "skipping ambulatory-difficulty metrics");
        None
    };
    let table = output::annotation_dataframe(&annotations, client.variables(), metrics.as_deref())?;
    let mut annotated = output::join_annotations(&tracts, &table)?;

    if let Some(metrics) = &metrics {
        print_summary(metrics);
    }
    println!("\n=== First 3 rows of annotated data ===");
    println!("{}", annotated.head(Some(3)));

    if let Some(Err(e)) = metrics.as_deref().map(annotator::check_quality) {
        let partial = output::write_csv_partial(&output_path, &mut annotated)?;
        println!("\nAnnotated data kept at {} for inspection", partial.display());
        return Err(e.into());
    }
    output::write_csv(&output_path, &mut annotated)?;
    println!("\nSaved annotated data to {}", output_path.display());
    Ok(())
}

fn print_summary(metrics: &[AmbulatoryDifficulty]) {
    println!("\n=== Summary Statistics ===");
    let counts: [(&str, fn(&AmbulatoryDifficulty) -> i64); 4] = [
        ("Total Population 5+", |m| m.total_pop_5plus),
        ("Total with Ambulatory Difficulty", |m| m.total_amb_diff),
        ("Population 65+", |m| m.pop_65plus),
        ("Population 65+ with Ambulatory Difficulty", |m| m.pop_65plus_amb_diff),
    ];
    for (label, f) in counts {
        let values: Vec<f64> = metrics.iter().map(|m| f(m) as f64).collect();
        let (min, max, mean) = stats(&values);
        println!("\n{label}:\n  Min: {min}\n  Max: {max}\n  Mean: {mean:.1}");
    }

    let percentages: [(&str, fn(&AmbulatoryDifficulty) -> f64); 2] = [
        ("Percentage with Ambulatory Difficulty", |m| m.total_amb_diff_pct),
        ("Percentage 65+ with Ambulatory Difficulty", |m| {
            m.pop_65plus_amb_diff_pct
        }),
    ];
    for (label, f) in percentages {
        let values: Vec<f64> = metrics.iter().map(f).collect();
        let (min, max, mean) = stats(&values);
        println!("\n{label}:\n  Min: {min:.2}%\n  Max: {max:.2}%\n  Mean: {mean:.2}%");
    }
}

fn stats(values: &[f64]) -> (f64, f64, f64) {
    debug_assert!(!values.is_empty());
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
    (min, max, mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        assert_eq!(stats(&[2.0, 8.0, 5.0]), (2.0, 8.0, 5.0));
        assert_eq!(stats(&[3.5]), (3.5, 3.5, 3.5));
    }
}
