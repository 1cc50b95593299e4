//! Status command - catalog counts by category and pattern.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use ensemble_domain::StatusReport;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// List every pipeline name
    #[arg(short, long)]
    pub detailed: bool,
}

/// Status for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    capabilities: usize,
    #[serde(flatten)]
    report: StatusReport,
    skipped: Vec<SkippedOutput>,
    config_files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SkippedOutput {
    category: String,
    reason: String,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let services = ctx.services_from(&loaded)?;
    let report = services.pipelines().status_report();
    let bootstrap = services.bootstrap_report();

    if ctx.json_output {
        let output = StatusOutput {
            capabilities: services.catalog().len(),
            report,
            skipped: bootstrap
                .failed
                .iter()
                .map(|(category, reason)| SkippedOutput {
                    category: category.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            config_files: loaded
                .loaded_from()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let red = Style::new().red();

    println!();
    println!("{}", style("Ensemble Catalog Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Capabilities:"), services.catalog().len());
    println!("  {} {}", dim.apply_to("Pipelines:"), report.total);

    println!();
    println!("  {}", dim.apply_to("By category"));
    for (category, count) in &report.by_category {
        println!("    {category:<22} {count}");
    }

    println!();
    println!("  {}", dim.apply_to("By pattern"));
    for (pattern, count) in &report.by_pattern {
        println!("    {pattern:<22} {count}");
    }

    if !bootstrap.failed.is_empty() {
        println!();
        println!("  {}", red.apply_to("Skipped"));
        for (category, reason) in &bootstrap.failed {
            println!("    {category}: {}", dim.apply_to(reason));
        }
    }

    if args.detailed {
        println!();
        println!("{}", dim.apply_to("─".repeat(40)));
        for name in &report.names {
            println!("    {name}");
        }
    }

    let sources = loaded.loaded_from();
    if ctx.verbose || !sources.is_empty() {
        println!();
        if sources.is_empty() {
            println!("  {}", dim.apply_to("No config files loaded (using defaults)"));
        }
        for path in sources {
            println!("  {} {}", dim.apply_to("Config:"), path.display());
        }
    }

    println!();
    Ok(())
}
