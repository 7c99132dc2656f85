use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sli_builder::config::{self, Config};
use sli_builder::master::ProductRecord;
use sli_builder::pipeline::{self, Pipeline};
use sli_builder::session;
use sli_builder::store::StoredProduct;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sli-builder", version, about = "Build a Shipper's Letter of Instruction from commercial invoices")]
struct Cli {
    /// Config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "sli.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the line items parsed from each invoice as JSON.
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Parse invoices and write the SLI workbook.
    Generate {
        /// Shipment header (TOML).
        #[arg(long)]
        header: PathBuf,
        /// Session key; derived from the file list when omitted.
        #[arg(long)]
        session: Option<String>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Rebuild a session's workbook from its cached parse.
    Resume {
        #[arg(long)]
        header: PathBuf,
        #[arg(long)]
        session: String,
    },
    /// Drop a session's cached parse.
    Reset {
        #[arg(long)]
        session: String,
    },
    /// Product master data.
    Master {
        #[command(subcommand)]
        command: MasterCommand,
    },
}

#[derive(Subcommand)]
enum MasterCommand {
    /// Add or replace a product record.
    Set {
        code: String,
        #[arg(long)]
        unit_weight: f64,
        /// Carton shipping weight in pounds.
        #[arg(long)]
        carton_weight: f64,
        #[arg(long)]
        units_per_carton: u32,
        #[arg(long)]
        uom: String,
    },
    List,
    /// Records marked as needing correction.
    Flagged,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let pipeline = Pipeline::from_config(&cfg).context("opening store and template")?;

    match cli.command {
        Command::Parse { files } => {
            let lists = pipeline.parse_sources(&files)?;
            for (file, items) in files.iter().zip(&lists) {
                info!(file = %file.display(), items = items.len(), "Parsed");
            }
            println!("{}", serde_json::to_string_pretty(&lists)?);
        }
        Command::Generate {
            header,
            session,
            files,
        } => {
            let key = session.unwrap_or_else(|| session::session_key(&files));
            let header = config::load_header(&header)
                .with_context(|| format!("loading header {}", header.display()))?;
            let result = pipeline.generate(&files, &key, &header, &pipeline::today_utc());
            finish(result, &key, &cfg)?;
        }
        Command::Resume { header, session } => {
            let header = config::load_header(&header)
                .with_context(|| format!("loading header {}", header.display()))?;
            let result = pipeline.resume(&session, &header, &pipeline::today_utc());
            finish(result, &session, &cfg)?;
        }
        Command::Reset { session } => {
            if pipeline.reset(&session)? {
                println!("session {session} cleared");
            } else {
                println!("no cached run for session {session}");
            }
        }
        Command::Master { command } => run_master(&pipeline, command)?,
    }

    let (products, flagged, sessions) = pipeline.store().get_counts()?;
    info!(products, flagged, sessions, "Database statistics");
    Ok(())
}

fn finish(
    result: sli_builder::SliResult<sli_builder::GeneratedDocument>,
    session: &str,
    cfg: &Config,
) -> Result<()> {
    let doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            if let Some(codes) = e.missing_codes() {
                eprintln!("Master data missing for:");
                for code in codes {
                    eprintln!("  {code}");
                }
                eprintln!(
                    "Enter them with `sli-builder master set`, then run \
                     `sli-builder resume --session {session} --header <file>`."
                );
            }
            return Err(e.into());
        }
    };

    for warning in &doc.warnings {
        warn!(%warning, "Data quality");
    }
    let path = doc.write_to(&cfg.output_dir)?;
    println!("{} ({}, {} bytes)", path.display(), doc.mime_type, doc.bytes.len());
    Ok(())
}

fn run_master(pipeline: &Pipeline, command: MasterCommand) -> Result<()> {
    let store = pipeline.store();
    match command {
        MasterCommand::Set {
            code,
            unit_weight,
            carton_weight,
            units_per_carton,
            uom,
        } => {
            let record = ProductRecord {
                unit_weight,
                carton_weight,
                units_per_carton,
                unit_of_measure: uom,
            };
            store.upsert(&code, &record)?;
            if record.is_degenerate() {
                warn!(code = %code, "units per carton is 0; gross weight will be skipped");
            }
        }
        MasterCommand::List => print_products(&store.list_products()?),
        MasterCommand::Flagged => print_products(&store.flagged_products()?),
    }
    Ok(())
}

fn print_products(products: &[StoredProduct]) {
    for p in products {
        println!(
            "{:<24} {:>10} {:<4} {:>10} lb/ctn {:>6}/ctn{}",
            p.code,
            p.record.unit_weight,
            p.record.unit_of_measure,
            p.record.carton_weight,
            p.record.units_per_carton,
            if p.needs_correction { "  NEEDS CORRECTION" } else { "" }
        );
    }
}
