use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};

use tractgetter::cli::CommonArgs;
use tractgetter::getter;
use tractgetter::{map, output, selector};

/// Selects the Census tracts within a radius of a reference point and writes
/// them as CSV, GeoJSON and an HTML map.
#[derive(Parser, Debug)]
#[command(name = "select-tracts", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.common.init_tracing();

    match run(&cli.common).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &CommonArgs) -> Result<()> {
    let config = args.config()?;
    let out = &config.output;
    output::remove_stale(&[out.tracts_csv(), out.tracts_geojson(), out.map_html()])?;

    let source = getter::from_config(&config.geometry)?;
    let tracts = source.tracts(&config.state).await?;
    println!("Loaded {} tracts for state {}", tracts.len(), config.state);

    let selection = selector::select_tracts(
        tracts,
        &config.reference,
        config.radius_miles,
        config.convention,
    )?;
    if selection.is_empty() {
        warn!("no tract lies within {} mi of {}", config.radius_miles, config.reference.label);
    }

    let mut df = output::selection_dataframe(&selection)?;
    println!(
        "Tracts within {} mi of {} ({:?} distance):",
        config.radius_miles, config.reference.label, config.convention
    );
    println!("{}", df);

    let features = output::selection_geojson(&selection);
    output::write_csv(&out.tracts_csv(), &mut df)?;
    output::write_geojson(&out.tracts_geojson(), features.clone())?;
    map::write_map(&out.map_html(), &selection, &features)?;
    Ok(())
}
