use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use packing_core::{
    build_manifest, load_file, record_from_values, CatalogEntry, EngineConfig, Packer,
    PackingResult, RawRecord, ReferenceData, ShippingFeeRule,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "packer")]
#[command(about = "Packing planner - group orders into boxes and resolve shipping fees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Order records, an array of field-keyed rows (YAML or JSON)
    #[arg(short, long)]
    input: PathBuf,

    /// Shipping-fee rate table (YAML or JSON)
    #[arg(short, long)]
    fees: PathBuf,

    /// Design-code catalog (YAML or JSON)
    #[arg(short, long)]
    catalog: PathBuf,

    /// Engine configuration; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack orders into boxes
    Pack {
        #[command(flatten)]
        inputs: Inputs,

        /// Output file for the packing result (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build courier manifest rows for one export view
    Manifest {
        #[command(flatten)]
        inputs: Inputs,

        /// View name from the engine configuration
        #[arg(long, default_value = "combined")]
        view: String,

        /// Output file for the rows (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pack { inputs, output } => {
            pack_command(inputs, output)?;
        }
        Commands::Manifest {
            inputs,
            view,
            output,
        } => {
            manifest_command(inputs, view, output)?;
        }
    }

    Ok(())
}

fn run_pipeline(inputs: &Inputs) -> Result<(Packer, PackingResult)> {
    println!("{}", "🔍 Loading input...".bright_blue());

    let rows: Vec<BTreeMap<String, Value>> = load_file(&inputs.input)?;
    let records: Vec<RawRecord> = rows.into_iter().map(record_from_values).collect();
    let fee_table: Vec<ShippingFeeRule> = load_file(&inputs.fees)?;
    let catalog: Vec<CatalogEntry> = load_file(&inputs.catalog)?;
    let config: EngineConfig = match &inputs.config {
        Some(path) => load_file(path)?,
        None => EngineConfig::default(),
    };

    println!(
        "  {} order records",
        records.len().to_string().bright_white().bold()
    );
    println!(
        "  {} fee rules, {} catalog entries",
        fee_table.len().to_string().bright_white().bold(),
        catalog.len().to_string().bright_white().bold()
    );
    println!();

    println!("{}", "📦 Packing...".bright_blue());
    let packer = Packer::new(ReferenceData::new(fee_table, catalog), config)?;
    let result = packer.pack_records(&records);

    println!();
    println!("{}", "✅ Packing complete!".bright_green().bold());
    println!();

    Ok((packer, result))
}

fn pack_command(inputs: Inputs, output: Option<PathBuf>) -> Result<()> {
    let (_, result) = run_pipeline(&inputs)?;
    print_summary(&result);
    write_output(&result, output)
}

fn manifest_command(inputs: Inputs, view: String, output: Option<PathBuf>) -> Result<()> {
    let (packer, result) = run_pipeline(&inputs)?;
    let manifest_view = packer
        .config()
        .view(&view)
        .with_context(|| format!("Unknown manifest view '{}'", view))?;

    let rows = build_manifest(&result, manifest_view, packer.config());
    print_summary(&result);
    println!(
        "  Manifest '{}': {} rows",
        view.bright_white(),
        rows.len().to_string().bright_white().bold()
    );
    println!();

    write_output(&rows, output)
}

fn print_summary(result: &PackingResult) {
    let summary = &result.summary;

    println!("{}", "📊 Results:".bright_yellow().bold());
    println!(
        "  Recipients: {}",
        summary.recipients.to_string().bright_white().bold()
    );
    println!(
        "  Boxes: {} (courier A: {}, courier B: {})",
        summary.boxes.to_string().bright_white().bold(),
        summary.courier_a_boxes,
        summary.courier_b_boxes
    );
    println!(
        "  Total shipping fee: {}",
        summary.total_fee.to_string().bright_white().bold()
    );
    if summary.group_gifts > 0 {
        println!("  Group gifts: {}", summary.group_gifts);
    }

    if summary.unresolved_fees > 0 {
        println!();
        println!(
            "  {} boxes need manual pricing:",
            summary.unresolved_fees.to_string().bright_red().bold()
        );
        for packed in result.unresolved() {
            println!(
                "    • {} {}",
                packed.label.bright_white(),
                packed.design_text
            );
        }
    }

    if summary.warnings > 0 {
        println!();
        println!(
            "  {} warnings:",
            summary.warnings.to_string().bright_yellow().bold()
        );
        for packed in result.boxes.iter().filter(|b| !b.warnings.is_empty()) {
            for warning in &packed.warnings {
                println!("    • {}: {}", packed.label.bright_white(), warning);
            }
        }
    }

    println!();
}

fn write_output<T: Serialize>(value: &T, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(output_path) = output {
        std::fs::write(&output_path, json)?;
        println!(
            "💾 Saved result to {}",
            output_path.display().to_string().bright_white()
        );
    } else {
        println!("{}", json);
    }
    Ok(())
}
