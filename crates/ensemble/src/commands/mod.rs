//! CLI command handlers.

pub mod capabilities;
pub mod config;
pub mod dispatch;
pub mod pipelines;
pub mod run;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use console::Style;
use ensemble_config::LoadedConfig;
use ensemble_domain::{DomainServices, DryRunInvoker, Execution, ExecutionEvent, RunOutcome};
use ensemble_types::EventPayload;
use serde::Serialize;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Explicit user config directory.
    pub config_dir: Option<PathBuf>,
    /// Directory searched for the project config file.
    pub project_dir: Option<PathBuf>,
}

impl Context {
    /// Discover and merge config layers, logging any warnings.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = ensemble_config::load_config_with_options(
            self.project_dir.as_deref(),
            self.config_dir.as_deref(),
        )?;
        for warning in &loaded.warnings {
            tracing::warn!("{warning}");
        }
        Ok(loaded)
    }

    /// Domain services over the loaded config, answering with the dry-run
    /// invoker.
    pub fn services(&self) -> Result<DomainServices> {
        let loaded = self.load_config()?;
        self.services_from(&loaded)
    }

    pub fn services_from(&self, loaded: &LoadedConfig) -> Result<DomainServices> {
        Ok(DomainServices::from_config(
            &loaded.config,
            Arc::new(DryRunInvoker),
        )?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution output
// ─────────────────────────────────────────────────────────────────────────────

/// Run result for JSON output.
#[derive(Debug, Serialize)]
struct OutcomeOutput<'a> {
    pipeline: &'a str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    events: &'a [ExecutionEvent],
    state: &'a serde_json::Map<String, serde_json::Value>,
}

/// Drive an execution to completion, printing events as they arrive.
///
/// Ctrl-C cancels the run; events already emitted are kept.
pub async fn drive(mut execution: Execution, ctx: &Context) -> Result<RunOutcome> {
    let token = execution.cancellation_token();
    let mut interrupted = false;

    if !ctx.json_output {
        println!();
        println!(
            "{}",
            Style::new().bold().apply_to(execution.pipeline_name())
        );
        println!("{}", Style::new().dim().apply_to("─".repeat(40)));
    }

    loop {
        tokio::select! {
            event = execution.next_event() => match event {
                Some(event) => {
                    if !ctx.json_output {
                        print_event(&event, ctx.verbose);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                token.cancel();
            }
        }
    }

    Ok(execution.finish().await)
}

fn print_event(event: &ExecutionEvent, verbose: bool) {
    let dim = Style::new().dim();
    let cyan = Style::new().cyan();
    let yellow = Style::new().yellow();
    let red = Style::new().red();

    match &event.payload {
        EventPayload::Output {
            text, escalate, ..
        } => {
            let marker = if *escalate { " ⇡" } else { "" };
            println!(
                "  {} {}{}",
                cyan.apply_to(format!("{}:", event.producer)),
                text,
                yellow.apply_to(marker)
            );
        }
        EventPayload::BranchFailed { member, message } => {
            println!("  {} {member}: {message}", red.apply_to("✗"));
        }
        EventPayload::IterationCompleted { iteration, exit } => {
            let note = if *exit { " (exit)" } else { "" };
            println!(
                "  {}",
                dim.apply_to(format!("── {} iteration {iteration}{note}", event.pipeline))
            );
        }
        EventPayload::Notice { text } => {
            println!("  {} {text}", yellow.apply_to("!"));
        }
    }

    if verbose {
        println!(
            "    {}",
            dim.apply_to(format!("#{} {}", event.seq, event.timestamp.to_rfc3339()))
        );
    }
}

/// Print the final outcome; an error outcome becomes the command's error.
pub fn report_outcome(outcome: RunOutcome, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let output = OutcomeOutput {
            pipeline: &outcome.pipeline,
            success: outcome.is_success(),
            error: outcome.error.as_ref().map(|e| e.to_string()),
            events: &outcome.events,
            state: outcome.state.values(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to("─".repeat(40)));
        let iterations = outcome.iterations();
        if iterations > 0 {
            println!("  {} {iterations}", dim.apply_to("Iterations:"));
        }
        println!(
            "  {} {}",
            dim.apply_to("State keys:"),
            outcome
                .state
                .values()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        match &outcome.error {
            None => println!("  {}", Style::new().green().apply_to("● completed")),
            Some(err) => println!("  {} {err}", Style::new().red().apply_to("● failed:")),
        }
        println!();
    }

    outcome.into_result()?;
    Ok(())
}

/// Parse `key=value` pairs; values that parse as JSON keep their type.
pub fn parse_state_pairs(pairs: &[String]) -> Result<Vec<(String, serde_json::Value)>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{pair}'"))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_pairs() {
        let pairs = parse_state_pairs(&[
            "done=true".to_string(),
            "budget=1200".to_string(),
            "owner=ops team".to_string(),
        ])
        .unwrap();
        assert_eq!(pairs[0], ("done".to_string(), serde_json::json!(true)));
        assert_eq!(pairs[1], ("budget".to_string(), serde_json::json!(1200)));
        assert_eq!(pairs[2], ("owner".to_string(), serde_json::json!("ops team")));
    }

    #[test]
    fn test_parse_state_pairs_rejects_missing_equals() {
        assert!(parse_state_pairs(&["nope".to_string()]).is_err());
    }
}
