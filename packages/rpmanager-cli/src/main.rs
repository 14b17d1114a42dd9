//! RP Manager CLI - discover and control devices on the local network
//!
//! This binary lets you:
//! - Scan the network for devices serving the device API
//! - Store API keys, list device functions and call them
//! - Collect functions from several devices into named remotes
//! - Keep device presence fresh with a periodic watch

mod remote;
mod watch;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rpmanager_core::config::{self, ManagerConfig};
use rpmanager_core::{DisplayDevice, FunctionCatalog, Session};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "rpmanager")]
#[command(version)]
#[command(about = "Discover and control devices on the local network")]
#[command(long_about = "
RP Manager finds devices that serve the device HTTP API on your network,
lets you call the functions they expose, and groups functions from
several devices into remotes.

Quick start:
  1. Find devices:      rpmanager scan
  2. Store a key:       rpmanager set-key 192.168.1.20 5000 <key>
  3. See functions:     rpmanager functions 192.168.1.20 5000
  4. Call one:          rpmanager call 192.168.1.20 5000 set_led -i on=true
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the network for devices
    Scan,

    /// List known devices and whether they are online
    Devices,

    /// Validate and store the API key of a device
    SetKey {
        host: String,
        port: u16,
        api_key: String,
    },

    /// List the functions a device offers
    Functions { host: String, port: u16 },

    /// Call a device function
    Call {
        host: String,
        port: u16,
        function: String,

        /// Input value as name=value (repeatable)
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, String)>,
    },

    /// Manage remotes
    #[command(subcommand)]
    Remote(remote::RemoteCommand),

    /// Forget all known devices (remotes are kept)
    ClearDevices,

    /// Rescan periodically to keep device presence fresh
    Watch {
        /// Scan interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// Show configuration paths and settings
    Config,
}

fn parse_input(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, v)) if !name.trim().is_empty() => Ok((name.trim().to_string(), v.to_string())),
        _ => Err(format!("expected name=value, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rpmanager={},rpmanager_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        match cli.format {
            OutputFormat::Text => eprintln!("Error: {:#}", e),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({
                    "error": format!("{:#}", e),
                }));
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = config::load_config().context("Failed to load configuration")?;

    if let Commands::Config = cli.command {
        return cmd_config(cli, &config);
    }

    let session = Session::open(&config)
        .with_context(|| format!("Failed to open store at {}", config.state_path().display()))?;

    match &cli.command {
        Commands::Scan => cmd_scan(cli, &session).await,
        Commands::Devices => cmd_devices(cli, &session).await,
        Commands::SetKey { host, port, api_key } => cmd_set_key(cli, &session, host, *port, api_key).await,
        Commands::Functions { host, port } => cmd_functions(cli, &session, host, *port).await,
        Commands::Call {
            host,
            port,
            function,
            inputs,
        } => cmd_call(cli, &session, host, *port, function, inputs).await,
        Commands::Remote(command) => remote::run(cli, &session, command).await,
        Commands::ClearDevices => cmd_clear_devices(cli, &session).await,
        Commands::Watch { interval } => watch::run_watch(&session, *interval).await,
        Commands::Config => Ok(()),
    }
}

async fn cmd_scan(cli: &Cli, session: &Session) -> Result<()> {
    match cli.format {
        OutputFormat::Text => println!(
            "Scanning {} candidates...",
            session.scanner().candidates().len()
        ),
        OutputFormat::Json => {}
    }

    let summary = session.scan().await?;

    match cli.format {
        OutputFormat::Text => {
            println!();
            println!("Found {} devices", summary.discovered);
            println!();
            print_devices(&summary.devices);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// One row of `devices --format json`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRow<'a> {
    host_port: &'a str,
    host: &'a str,
    port: u16,
    name: &'a str,
    description: &'a str,
    version: &'a str,
    last_seen: DateTime<Utc>,
    discovered: DateTime<Utc>,
    online: bool,
    has_api_key: bool,
}

async fn cmd_devices(cli: &Cli, session: &Session) -> Result<()> {
    let devices = session.registry().known_devices().await;
    let now = Utc::now();

    match cli.format {
        OutputFormat::Text => {
            if devices.is_empty() {
                println!("No known devices. Run 'rpmanager scan' first.");
                return Ok(());
            }
            for device in &devices {
                let status = if device.is_online_at(now) { "online" } else { "offline" };
                let key = if device.has_api_key() { "key" } else { "-" };
                println!(
                    "  {:22} {:8} {:4} {} ({}), seen {}",
                    device.host_port,
                    status,
                    key,
                    device.name,
                    device.version,
                    format_ago(now.signed_duration_since(device.last_seen))
                );
            }
        }
        OutputFormat::Json => {
            let rows: Vec<DeviceRow> = devices
                .iter()
                .map(|d| DeviceRow {
                    host_port: &d.host_port,
                    host: &d.host,
                    port: d.port,
                    name: &d.name,
                    description: &d.description,
                    version: &d.version,
                    last_seen: d.last_seen,
                    discovered: d.discovered,
                    online: d.is_online_at(now),
                    has_api_key: d.has_api_key(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn format_ago(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

async fn cmd_set_key(cli: &Cli, session: &Session, host: &str, port: u16, api_key: &str) -> Result<()> {
    let catalog = session.registry().save_api_key(host, port, api_key).await?;

    match cli.format {
        OutputFormat::Text => {
            println!("API key saved for {}:{}", host, port);
            println!();
            print_functions(&catalog);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "saved",
                "device": format!("{}:{}", host, port),
                "functions": catalog.functions,
            }));
        }
    }

    Ok(())
}

async fn cmd_functions(cli: &Cli, session: &Session, host: &str, port: u16) -> Result<()> {
    let catalog = session.registry().list_functions(host, port).await?;

    match cli.format {
        OutputFormat::Text => print_functions(&catalog),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&catalog)?),
    }

    Ok(())
}

async fn cmd_call(
    cli: &Cli,
    session: &Session,
    host: &str,
    port: u16,
    function: &str,
    inputs: &[(String, String)],
) -> Result<()> {
    let raw: BTreeMap<String, String> = inputs.iter().cloned().collect();
    let result = session
        .registry()
        .call_function(host, port, function, &raw)
        .await?;

    match cli.format {
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Json => println!("{}", result),
    }

    Ok(())
}

async fn cmd_clear_devices(cli: &Cli, session: &Session) -> Result<()> {
    let removed = session.registry().clear_devices().await?;

    match cli.format {
        OutputFormat::Text => println!("Removed {} devices", removed),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "cleared",
                "removed": removed,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &ManagerConfig) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let subnet = config.scan.subnet.as_deref().unwrap_or("(none)");

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Source:           {}", config.source);
            println!("Hosts:            {}", config.scan.hosts.join(", "));
            println!("Subnet:           {}", subnet);
            println!("Ports:            {:?}", config.scan.ports);
            println!("Scan timeout:     {}ms", config.scan.timeout.as_millis());
            println!("Request timeout:  {}ms", config.request_timeout.as_millis());
            println!("Store:            {}", config.state_path().display());
            println!();
            println!("Environment variables:");
            println!("  {} - Override subnet (\"none\" disables the sweep)", config::ENV_SUBNET);
            println!("  {} - Override ports (comma separated)", config::ENV_PORTS);
            println!("  {} - Override data directory", config::ENV_DATA_DIR);
            println!("  {} - Override scan timeout", config::ENV_SCAN_TIMEOUT_MS);
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": config.source.to_string(),
                "hosts": config.scan.hosts,
                "subnet": config.scan.subnet,
                "ports": config.scan.ports,
                "scan_timeout_ms": config.scan.timeout.as_millis() as u64,
                "request_timeout_ms": config.request_timeout.as_millis() as u64,
                "store": config.state_path(),
            }));
        }
    }

    Ok(())
}

fn print_devices(devices: &[DisplayDevice]) {
    for device in devices {
        let status = if device.is_online() { "online" } else { "offline" };
        println!(
            "  {:22} {:8} {} ({})",
            device.key(),
            status,
            device.name(),
            device.version()
        );
    }
}

fn print_functions(catalog: &FunctionCatalog) {
    println!("{} functions:", catalog.functions.len());
    for function in &catalog.functions {
        println!();
        println!("  {} - {}", function.id, function.name);
        if !function.description.is_empty() {
            println!("    {}", function.description);
        }
        for input in &function.inputs {
            let required = if input.required { ", required" } else { "" };
            match &input.description {
                Some(description) => println!("    -i {}=<{}{}>  {}", input.name, input.kind, required, description),
                None => println!("    -i {}=<{}{}>", input.name, input.kind, required),
            }
        }
    }
}
