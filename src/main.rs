//! powmesh - main application
//!
//! `powmesh seed` runs the directory service, `powmesh node` a miner or relay,
//! `powmesh submit` sends one transaction into the network.

use anyhow::Context;
use clap::Parser;
use powmesh::{
    config::{self, Cli, Command},
    node::NodeRuntime,
    seed, utils, wallet, APP_NAME, APP_VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = utils::init_logging(&cli.logging()).context("Failed to initialize logging")?;
    let config_file = cli.config_file.as_deref();

    match cli.command {
        Command::Seed(section) => {
            let section = section.load(config_file).context("Invalid seed configuration")?;
            if cli.print_config {
                return print_configuration(&section);
            }

            info!("Starting {} v{} seed directory", APP_NAME, APP_VERSION);
            seed::run_seed(section, shutdown_on_ctrl_c())
                .await
                .context("Seed directory failed")?;
        }
        Command::Node(section) => {
            let section = section.load(config_file).context("Invalid node configuration")?;
            if cli.print_config {
                return print_configuration(&section);
            }

            info!("Starting {} v{} {} node", APP_NAME, APP_VERSION, section.role);
            let runtime = NodeRuntime::bind(section).await.context("Failed to start node")?;
            runtime.run(shutdown_on_ctrl_c()).await.context("Node failed")?;
        }
        Command::Submit(section) => {
            let section = section.load(config_file).context("Invalid submit configuration")?;
            if cli.print_config {
                return print_configuration(&section);
            }

            let tx = wallet::submit(&section).await.context("Failed to submit transaction")?;
            println!("{}", tx.id);
        }
    }

    Ok(())
}

/// Token cancelled on the first Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                trigger.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    token
}

/// Print the effective configuration section
fn print_configuration<T: serde::Serialize>(section: &T) -> anyhow::Result<()> {
    let yaml = config::to_yaml(section)?;
    println!("{}", yaml);
    Ok(())
}
