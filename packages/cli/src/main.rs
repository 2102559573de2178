#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the telecom site proximity pipeline.
//!
//! ```text
//! telecom_sites matrix --sites sites.csv --output matrix.csv
//! telecom_sites neighbours --sites sites.csv --output neighbours.csv -k 3
//! telecom_sites tag --sites sites.csv --reference roads.geojson \
//!     --label "Ring Road" --output tagged.geojson --buffers
//! ```
//!
//! Site coordinates and the reference geometry must already be projected
//! into the configured EPSG system (UTM zone 36N by default). Settings are
//! read from `--config <file.toml>` and overridden by flags.
//!
//! Uses `indicatif-log-bridge` (via [`telecom_sites_cli_utils::init_logger`])
//! so log lines and progress bars never fight for the terminal.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser)]
#[command(
    name = "telecom_sites",
    about = "Nearest-neighbour statistics and road tagging for telecom sites"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the pairwise distance matrix as CSV
    Matrix {
        /// Site snapshot CSV (id, x, y, `discovery_date`)
        #[arg(long)]
        sites: PathBuf,
        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },
    /// Write nearest-neighbour statistics per site as CSV
    Neighbours {
        /// Site snapshot CSV (id, x, y, `discovery_date`)
        #[arg(long)]
        sites: PathBuf,
        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
    },
    /// Run the full pipeline and tag sites against a reference geometry
    Tag {
        /// Site snapshot CSV (id, x, y, `discovery_date`)
        #[arg(long)]
        sites: PathBuf,
        /// `GeoJSON` file holding the reference line or polygon
        #[arg(long)]
        reference: PathBuf,
        /// Feature label to select from the reference file
        #[arg(long)]
        label: Option<String>,
        /// Feature property holding the label
        #[arg(long, default_value = "name")]
        label_property: String,
        /// Output path; `.geojson`/`.json` writes `GeoJSON`, anything else CSV
        #[arg(long)]
        output: PathBuf,
        /// Write buffer polygons instead of points to `GeoJSON` output
        #[arg(long)]
        buffers: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = telecom_sites_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref()).inspect_err(|e| {
        log::error!("Configuration failed: {e}");
    })?;
    cli.overrides.apply(&mut config);

    let k = telecom_sites_proximity::pipeline::validate_config(&config).inspect_err(|e| {
        log::error!("Configuration failed: {e}");
    })?;

    match cli.command {
        Commands::Matrix { sites, output } => commands::matrix(&sites, &output, &config)?,
        Commands::Neighbours { sites, output } => {
            commands::neighbours(&sites, &output, &config, k, &multi)?;
        }
        Commands::Tag {
            sites,
            reference,
            label,
            label_property,
            output,
            buffers,
        } => commands::tag(
            &commands::TagArgs {
                sites: &sites,
                reference: &reference,
                label: label.as_deref(),
                label_property: &label_property,
                output: &output,
                buffers,
            },
            &config,
            &multi,
        )?,
    }

    Ok(())
}
