//! Capabilities command - list the capability catalog.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;

/// Arguments for the capabilities command.
#[derive(Args, Debug)]
pub struct CapabilitiesArgs {
    /// Include instructions and tools
    #[arg(short, long)]
    pub detailed: bool,
}

/// Run the capabilities command.
pub async fn run(args: CapabilitiesArgs, ctx: &Context) -> Result<()> {
    let services = ctx.services()?;
    let catalog = services.catalog();

    if ctx.json_output {
        let descriptors: Vec<_> = catalog.descriptors().collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let bold = Style::new().bold();
    println!();
    for descriptor in catalog.descriptors() {
        println!(
            "  {:<12} {}",
            bold.apply_to(&descriptor.id),
            descriptor.name
        );
        if !descriptor.description.is_empty() {
            println!("  {:<12} {}", "", dim.apply_to(&descriptor.description));
        }
        if args.detailed {
            if !descriptor.tools.is_empty() {
                println!(
                    "  {:<12} {} {}",
                    "",
                    dim.apply_to("tools:"),
                    descriptor.tools.join(", ")
                );
            }
            println!(
                "  {:<12} {} {}",
                "",
                dim.apply_to("output key:"),
                descriptor.output_key()
            );
        }
    }
    println!();
    Ok(())
}
