//! Config command - configuration management.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use ensemble_config::{EnsembleConfig, save_config};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration as TOML
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./ensemble.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local, force } => cmd_init(local, force, ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# Ensemble Configuration\n");
    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)\n");
    } else {
        for path in sources {
            println!("# loaded: {}", path.display());
        }
        println!();
    }

    let effective = EnsembleConfig {
        engine: Some(config.engine()),
        dispatcher: Some(config.dispatcher()),
        capability: config.capabilities()?,
        pipeline: config.pipeline.clone(),
    };
    print!("{}", effective.to_toml()?);

    for warning in &loaded.warnings {
        println!("# warning: {warning}");
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    if ctx.json_output {
        let sources: Vec<_> = loaded
            .sources
            .iter()
            .map(|s| {
                serde_json::json!({
                    "path": s.path.display().to_string(),
                    "loaded": s.loaded,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    println!("Config files (lowest to highest precedence):\n");
    for (i, source) in loaded.sources.iter().enumerate() {
        let marker = if source.loaded { "✓" } else { "·" };
        println!("  {}. {} {}", i + 1, marker, source.path.display());
    }
    for warning in &loaded.warnings {
        println!("\n  warning: {warning}");
    }
    Ok(())
}

fn cmd_init(local: bool, force: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        ctx.project_dir
            .clone()
            .unwrap_or_default()
            .join(ensemble_config::discovery::PROJECT_CONFIG_FILE)
    } else {
        user_config_path(ctx)?
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = EnsembleConfig {
        engine: Some(Default::default()),
        dispatcher: Some(Default::default()),
        ..Default::default()
    };
    save_config(&config, &path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", user_config_path(ctx)?.display());
    Ok(())
}

fn user_config_path(ctx: &Context) -> Result<std::path::PathBuf> {
    let dir = match &ctx.config_dir {
        Some(dir) => dir.clone(),
        None => ensemble_config::xdg_config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine the user config directory"))?,
    };
    Ok(dir.join(ensemble_config::discovery::USER_CONFIG_FILE))
}
