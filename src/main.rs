// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal::unix::SignalKind;
use tracing::info;

use pdf_generator::config::{Config, CONFIG_MANAGER};
use pdf_generator::deploy::{write_deployment, DeployOptions};
use pdf_generator::signals::reload_config_on_signal;
use pdf_generator::utils::setup_logging;
use pdf_generator::PdfRenderer;

#[derive(Parser, Debug)]
#[command(name = "pdf-generator", version, about = "Render web pages to PDF over HTTP")]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true, env = "PDF_GENERATOR_CONFIG")]
    config: Option<String>,

    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// host:port, overrides the config file and PORT
        #[arg(short, long)]
        listen: Option<String>,
        /// Reload the config file when it changes
        #[arg(long)]
        watch: bool,
    },
    /// Render the systemd unit, nginx site, firewall script and config
    Deploy {
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        options: DeployOptions,
    },
    /// Parse the config and print it with all defaults applied
    CheckConfig,
}

fn parse_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::parse(path),
        None => Ok(Config::empty()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = parse_config(cli.config.as_deref())?;
    // logging first, so postprocess warnings are reported
    setup_logging(cli.debug || config.debug);
    let config = config.postprocess()?;

    match cli.command.unwrap_or(Command::Serve {
        listen: None,
        watch: false,
    }) {
        Command::Serve { listen, watch } => {
            let listen = listen.unwrap_or_else(|| config.server.listen());
            CONFIG_MANAGER.set_config(config.clone()).await;
            match cli.config.as_deref() {
                Some(path) => {
                    if watch {
                        CONFIG_MANAGER.watch_config(path).await?;
                    }
                    reload_config_on_signal(
                        CONFIG_MANAGER.clone(),
                        path.to_string(),
                        SignalKind::hangup(),
                    )?;
                }
                None => info!("No config file given, using defaults"),
            }
            pdf_generator::start(&listen, PdfRenderer::chromium(), CONFIG_MANAGER.clone()).await
        }
        Command::Deploy { output, options } => {
            let written = write_deployment(&options, &config, &output)?;
            for path in written {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::CheckConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}
