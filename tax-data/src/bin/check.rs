use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tax_data::TaxDataSet;
use tracing_subscriber::EnvFilter;

/// Validate a tax data directory and print what it contains.
///
/// The directory holds one sub-directory per tax year, each with:
/// - federal.toml: federal parameters
/// - federal_brackets.csv: IRS schedules X, Y-1, Y-2 and Z
/// - states.toml: state configurations (optional)
///
/// Without --dir the data compiled into the binary is checked.
#[derive(Parser, Debug)]
#[command(name = "tax-data-check")]
#[command(version, about, long_about = None)]
struct Args {
    /// Data directory to validate
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// List every jurisdiction, not just the totals
    #[arg(short, long, default_value_t = false)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let data = match &args.dir {
        Some(dir) => {
            println!("Checking tax data in: {}", dir.display());
            TaxDataSet::load_dir(dir)
                .with_context(|| format!("Invalid tax data in: {}", dir.display()))?
        }
        None => {
            println!("Checking embedded tax data");
            TaxDataSet::embedded().context("Embedded tax data is invalid")?
        }
    };

    let registry = data.state_registry();
    for year in data.years() {
        let states: Vec<_> = registry
            .jurisdictions()
            .into_iter()
            .filter(|(_, tax_year)| *tax_year == year)
            .filter_map(|(code, tax_year)| registry.get(code, tax_year).ok())
            .collect();

        let taxing = states.iter().filter(|c| c.config().has_income_tax).count();
        let flat = states.iter().filter(|c| c.config().is_flat_tax).count();
        let local = states.iter().filter(|c| c.config().has_local_tax).count();
        println!(
            "{year}: federal parameters ok, {} jurisdictions ({taxing} with income tax, {flat} flat, {local} with local tax)",
            states.len()
        );

        if args.list {
            for calculator in &states {
                let config = calculator.config();
                let kind = match (config.has_income_tax, config.is_flat_tax) {
                    (false, _) => "no income tax",
                    (true, true) => "flat",
                    (true, false) => "progressive",
                };
                println!("  {} {:<22} {kind}", config.state_code, config.state_name);
            }
        }
    }

    println!("Tax data is valid.");
    Ok(())
}
