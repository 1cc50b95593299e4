//! Run command - execute a catalog pipeline.

use anyhow::Result;
use clap::Args;

use ensemble_domain::SessionState;

use super::{Context, drive, parse_state_pairs, report_outcome};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Catalog name of the pipeline
    pub name: String,

    /// Request text handed to every unit
    #[arg(short, long, default_value = "")]
    pub input: String,

    /// Initial session state entries (key=value, value parsed as JSON when possible)
    #[arg(short, long = "state", value_name = "KEY=VALUE")]
    pub state: Vec<String>,

    /// Session identifier (default: random)
    #[arg(long)]
    pub session: Option<String>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let services = ctx.services()?;

    let session = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut state = SessionState::new(session);
    for (key, value) in parse_state_pairs(&args.state)? {
        state.set(key, value);
    }

    let execution = services
        .pipelines()
        .run_pipeline(&args.name, args.input, state)?;
    let outcome = drive(execution, ctx).await?;
    report_outcome(outcome, ctx)
}
