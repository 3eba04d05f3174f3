// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;
mod summary;

use std::path::PathBuf;
use std::time::Duration;

use acars_state::prefs;
use acars_state::{Client, ClientConfig, ConnectionConfig};
use clap::{Parser, Subcommand};
use config::AppConfig;
use log::{error, info, warn};

#[derive(Parser)]
#[command(name = "acars-monitor")]
#[command(about = "Follow a live ACARS/VDLM/HFDL message feed", long_about = None)]
struct Args {
    /// Server address (host:port); overrides the configured server
    #[arg(long)]
    address: Option<String>,

    /// Log filter passed to env_logger when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Poll signal, frequency and count statistics
    #[arg(long)]
    stats: bool,

    /// Seconds between printed summaries (0 disables them)
    #[arg(long, default_value = "30")]
    summary_interval: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write the saved preferences to a JSON file
    ExportPrefs {
        path: PathBuf,
    },
    /// Validate a preferences JSON file and save it to the config
    ImportPrefs {
        path: PathBuf,
    },
    /// Print the location of the config file
    ConfigPath,
}

fn handle_command(command: Command, mut config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::ExportPrefs { path } => {
            let json = prefs::export_json(&config.preferences)?;
            std::fs::write(&path, json)?;
            println!("Preferences exported to {}", path.display());
        }
        Command::ImportPrefs { path } => {
            let json = std::fs::read_to_string(&path)?;
            config.preferences = prefs::import_json(&json)?;
            config.save()?;
            println!("Preferences imported from {}", path.display());
        }
        Command::ConfigPath => {
            println!("{}", AppConfig::get_config_path()?.display());
        }
    }
    Ok(())
}

fn client_config(config: &AppConfig, address: Option<String>) -> ClientConfig {
    let address = address
        .or_else(|| config.active_server().map(|s| s.address.clone()))
        .unwrap_or_else(|| acars_state::stream::DEFAULT_ADDRESS.to_string());

    ClientConfig {
        connection: ConnectionConfig {
            address,
            reconnect_delay: config.reconnect_delay(),
            ..ConnectionConfig::default()
        },
        reconciler: config.reconciler_config(),
        preferences: config.preferences.clone(),
        ..ClientConfig::default()
    }
}

fn log_notifications(client: &mut Client) {
    for notification in client.state_mut().take_notifications() {
        if notification.toast {
            warn!(
                "ALERT {} matched {} ({})",
                notification.group,
                notification.terms.join(", "),
                notification.uid
            );
        }
        if notification.sound {
            // Terminal bell
            eprint!("\x07");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    };
    if let Err(e) = config.preferences.validate() {
        error!("Saved preferences are invalid: {}", e);
        return Err(e.into());
    }

    if let Some(command) = args.command {
        return handle_command(command, config);
    }

    let mut client = Client::spawn(client_config(&config, args.address));
    info!("Connecting to {}", client.address());
    if args.stats {
        client.start_statistics(config.stats_poll_interval());
    }

    let period = Duration::from_secs(args.summary_interval.max(1));
    let mut summary_tick = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            more = client.process_next() => {
                if !more {
                    break;
                }
                log_notifications(&mut client);
            }
            _ = summary_tick.tick(), if args.summary_interval > 0 => {
                print!("{}", summary::render(client.state(), chrono::Utc::now()));
            }
            _ = &mut ctrl_c => {
                info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown();
    Ok(())
}
