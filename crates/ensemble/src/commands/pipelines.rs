//! Pipelines command - browse the pipeline catalog.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;

use ensemble_domain::PipelineMetadata;

use super::Context;

/// Arguments for the pipelines command.
#[derive(Args, Debug)]
pub struct PipelinesArgs {
    #[command(subcommand)]
    pub command: PipelinesCommand,
}

#[derive(Subcommand, Debug)]
pub enum PipelinesCommand {
    /// List catalog pipelines
    List {
        /// Only pipelines in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Only pipelines that use this capability
        #[arg(short, long)]
        member: Option<String>,
    },

    /// Show a pipeline's category, members and pattern
    Show {
        /// Catalog name
        name: String,
    },
}

#[derive(Debug, Serialize)]
struct PipelineRow {
    name: String,
    #[serde(flatten)]
    metadata: PipelineMetadata,
}

/// Run the pipelines command.
pub async fn run(args: PipelinesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        PipelinesCommand::List { category, member } => {
            cmd_list(category.as_deref(), member.as_deref(), ctx)
        }
        PipelinesCommand::Show { name } => cmd_show(&name, ctx),
    }
}

fn cmd_list(category: Option<&str>, member: Option<&str>, ctx: &Context) -> Result<()> {
    let services = ctx.services()?;
    let pipelines = services.pipelines();

    let mut names = match category {
        Some(category) => pipelines.list_by_category(category),
        None => pipelines.list_pipelines(),
    };
    if let Some(member) = member {
        let using = pipelines.list_by_member(member);
        names.retain(|name| using.contains(name));
    }

    let rows: Vec<PipelineRow> = names
        .into_iter()
        .filter_map(|name| {
            let metadata = pipelines.pipeline_metadata(&name).ok()?;
            Some(PipelineRow { name, metadata })
        })
        .collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if rows.is_empty() {
        println!("{}", dim.apply_to("No pipelines match."));
        return Ok(());
    }

    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    println!();
    for row in &rows {
        println!(
            "  {:<width$}  {:<20} {}",
            row.name,
            dim.apply_to(&row.metadata.category),
            Style::new().cyan().apply_to(&row.metadata.pattern),
        );
    }
    println!();
    println!("  {} {}", dim.apply_to("Total:"), rows.len());
    println!();
    Ok(())
}

fn cmd_show(name: &str, ctx: &Context) -> Result<()> {
    let services = ctx.services()?;
    let metadata = services.pipelines().pipeline_metadata(name)?;

    if ctx.json_output {
        let row = PipelineRow {
            name: name.to_string(),
            metadata,
        };
        println!("{}", serde_json::to_string_pretty(&row)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style(name).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Category:"), metadata.category);
    println!("  {} {}", dim.apply_to("Pattern:"), metadata.pattern);
    println!("  {} {}", dim.apply_to("Members:"), metadata.members.join(", "));
    if !metadata.description.is_empty() {
        println!();
        println!("  {}", metadata.description);
    }
    println!();
    Ok(())
}
