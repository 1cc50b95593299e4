//! Dispatch command - classify a request and run an ad hoc pipeline.

use anyhow::Result;
use clap::Args;
use console::Style;

use ensemble_domain::SessionState;

use super::{Context, drive, report_outcome};

/// Arguments for the dispatch command.
#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Free-text request (falls back to the latest --history turn when empty)
    #[arg(default_value = "")]
    pub request: String,

    /// Prior user turns, oldest first
    #[arg(long = "history", value_name = "TEXT")]
    pub history: Vec<String>,

    /// Only print the classification; don't run anything
    #[arg(long)]
    pub classify_only: bool,
}

/// Run the dispatch command.
pub async fn run(args: DispatchArgs, ctx: &Context) -> Result<()> {
    let services = ctx.services()?;
    let dispatcher = services.dispatcher();

    let mut state = SessionState::new(uuid::Uuid::new_v4().to_string());
    for turn in &args.history {
        state.push_turn("user", turn.as_str());
    }

    if args.classify_only {
        let request = dispatcher
            .resolve_request(Some(args.request.as_str()), &state)
            .unwrap_or_default();
        let classification = dispatcher.classify(&request);
        if ctx.json_output {
            println!("{}", serde_json::to_string_pretty(&classification)?);
        } else {
            let dim = Style::new().dim();
            println!();
            println!("  {} {}", dim.apply_to("Request:"), classification.request);
            println!("  {} {}", dim.apply_to("Pattern:"), classification.pattern);
            println!(
                "  {} {}{}",
                dim.apply_to("Members:"),
                classification.members.join(", "),
                if classification.fallback {
                    dim.apply_to(" (fallback)").to_string()
                } else {
                    String::new()
                }
            );
            println!();
        }
        return Ok(());
    }

    let execution = dispatcher.run_dynamic(&args.request, state);
    let outcome = drive(execution, ctx).await?;
    report_outcome(outcome, ctx)
}
