use clap::{Parser, Subcommand};
use std::io::{stdout, Write};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::Result;
use crate::services::{SkipReason, SyncClient, SyncOutcome};

#[derive(Parser)]
#[command(name = "follower")]
#[command(version)]
#[command(about = "Leader/follower coordination engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml plus <FOLLOWER_ENV>.toml)
    #[arg(short, long, global = true, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine headless until Ctrl+C
    Run {
        /// Override the configured role (leader, follower, disabled)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Perform one synchronization exchange against a leader
    Probe {
        /// Leader status url, e.g. http://127.0.0.1:4412/status
        #[arg(short, long)]
        url: String,
        /// Request timeout in milliseconds
        #[arg(long, default_value = "3000")]
        timeout_ms: u64,
    },
    /// Load and validate the configuration
    CheckConfig,
}

/// Run one exchange and print what the leader answered
pub async fn probe(url: &str, timeout_ms: u64) -> Result<()> {
    let client = SyncClient::new()?;

    print!("  Requesting {}... ", url);
    stdout().flush()?;

    match client.exchange(url, Duration::from_millis(timeout_ms)).await {
        SyncOutcome::Received(obj) => {
            println!("\x1b[32mOK\x1b[0m");
            println!("    Leader: {}", obj.leader_name);
            println!("    Proximity radius: {}", obj.leader_proximity_radius);
        }
        SyncOutcome::Empty => println!("\x1b[33mEMPTY\x1b[0m (leader sent null)"),
        SyncOutcome::Skipped(SkipReason::EmptyUrl) => println!("\x1b[33mSKIPPED\x1b[0m (empty url)"),
        SyncOutcome::Skipped(SkipReason::Busy) => println!("\x1b[33mSKIPPED\x1b[0m (busy)"),
        SyncOutcome::Failed(reason) => {
            println!("\x1b[31mFAILED\x1b[0m");
            println!("    Error: {}", reason);
        }
    }

    Ok(())
}

/// Print every configuration problem; returns whether the config is usable
pub fn check_config(config_dir: &str) -> Result<bool> {
    let config = AppConfig::load_from(config_dir)?;

    println!("Configuration from {}:", config_dir);
    println!("  Role: {}", config.role);
    println!("  Follower mode: {}", config.follower.mode);
    println!("  Leader url: {}", config.follower.network.url);
    println!(
        "  Broadcast: {}:{}",
        config.leader.bind_address, config.leader.port
    );

    match config.validate() {
        Ok(()) => {
            println!("\n\x1b[32mOK\x1b[0m");
            Ok(true)
        }
        Err(errors) => {
            println!("\n\x1b[31m{} problem(s):\x1b[0m", errors.len());
            for error in &errors {
                println!("  - {}", error);
            }
            Ok(false)
        }
    }
}
