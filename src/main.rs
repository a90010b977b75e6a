//! FastWindow command line.
//!
//! Usage:
//!   fastwindow list
//!   fastwindow srcdoc <plugin-id>
//!   fastwindow config

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fastwindow_lib::bridge::{generate_token, sandbox_document, SANDBOX_FLAGS};
use fastwindow_lib::config::{self, PLUGINS_DIR_ENV};
use fastwindow_lib::loader::load_plugins_dir;
use fastwindow_lib::logging;
use fastwindow_lib::sdk::BootstrapConfig;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fastwindow")]
#[command(about = "FastWindow plugin shell")]
struct Args {
    /// Directory holding installed plugins (one folder per plugin id)
    #[arg(long, env = PLUGINS_DIR_ENV)]
    plugins_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List plugins that pass load-time checks
    List,
    /// Print the sandbox document a plugin would be mounted with
    Srcdoc {
        plugin_id: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut app_config = config::load_app_config();
    if let Some(dir) = args.plugins_dir {
        app_config.plugins_dir = Some(dir);
    }

    let level = if args.verbose {
        "debug"
    } else {
        app_config.log_level.as_str()
    };
    logging::init(level);

    match args.command {
        Command::List => {
            let plugins = load_plugins_dir(&app_config.plugins_dir());
            if plugins.is_empty() {
                eprintln!("No plugins in {}", app_config.plugins_dir().display());
            }
            for plugin in plugins {
                let m = &plugin.manifest;
                let requires = m
                    .requires()
                    .map(|r| r.join(","))
                    .unwrap_or_else(|| "*".to_string());
                println!("{}\t{}\t{}\trequires={requires}", m.id, m.version, m.name);
            }
        }
        Command::Srcdoc { plugin_id } => {
            let plugins = load_plugins_dir(&app_config.plugins_dir());
            let Some(plugin) = plugins.into_iter().find(|p| p.id() == plugin_id) else {
                bail!("plugin \"{plugin_id}\" is not installed or failed to load");
            };
            let mut bootstrap = BootstrapConfig::new(plugin.id(), generate_token());
            bootstrap.call_timeout_ms = app_config.call_timeout_ms;
            tracing::debug!(plugin_id = %plugin_id, sandbox = SANDBOX_FLAGS, "Rendering srcdoc");
            println!("{}", sandbox_document(&bootstrap, &plugin.source));
        }
        Command::Config => {
            let effective = json!({
                "configPath": config::config_path(),
                "pluginsDir": app_config.plugins_dir(),
                "dataDir": app_config.data_dir(),
                "outputDir": app_config.output_dir(),
                "callTimeoutMs": app_config.call_timeout_ms,
                "netTimeoutMs": app_config.net_timeout_ms,
                "capabilityMode": app_config.capability_mode,
                "logLevel": app_config.log_level,
            });
            let text = serde_json::to_string_pretty(&effective)
                .context("Failed to serialize configuration")?;
            println!("{text}");
        }
    }

    Ok(())
}
