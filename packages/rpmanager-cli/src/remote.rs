//! `rpmanager remote ...` commands

use crate::{Cli, OutputFormat};
use anyhow::Result;
use clap::Subcommand;
use rpmanager_core::{FunctionRef, Session, Toggled};

#[derive(Subcommand)]
pub enum RemoteCommand {
    /// List remotes
    List,

    /// Create a remote, optionally starting with one function
    Create {
        name: String,

        /// Device host of the first function
        #[arg(long, requires_all = ["port", "function"])]
        host: Option<String>,

        /// Device port of the first function
        #[arg(long)]
        port: Option<u16>,

        /// Function id of the first function
        #[arg(long)]
        function: Option<String>,
    },

    /// Rename a remote
    Rename { id: u64, name: String },

    /// Delete a remote and all of its functions
    Delete { id: u64 },

    /// Show the functions of a remote grouped by device
    Show { id: u64 },

    /// Add a device function to a remote
    Add {
        id: u64,
        host: String,
        port: u16,
        function: String,
    },

    /// Remove a function from a remote by its remote function id
    Remove { remote_function_id: u64 },

    /// Add a function if it is missing, remove it if present
    Toggle {
        id: u64,
        host: String,
        port: u16,
        function: String,
    },

    /// List the remotes that contain a device function
    Memberships {
        host: String,
        port: u16,
        function: String,
    },

    /// Count the online devices of a remote
    Status { id: u64 },
}

pub async fn run(cli: &Cli, session: &Session, command: &RemoteCommand) -> Result<()> {
    let remotes = session.remotes();

    match command {
        RemoteCommand::List => {
            let list = remotes.list().await;
            match cli.format {
                OutputFormat::Text => {
                    if list.is_empty() {
                        println!("No remotes. Create one with 'rpmanager remote create <name>'.");
                    }
                    for remote in &list {
                        let functions = remotes.functions(remote.id).await?.len();
                        println!(
                            "  {:4} {:24} {} functions (updated {})",
                            remote.id,
                            remote.name,
                            functions,
                            remote.updated.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&list)?),
            }
        }

        RemoteCommand::Create {
            name,
            host,
            port,
            function,
        } => {
            let (remote, first) = match (host, port, function) {
                (Some(host), Some(port), Some(function)) => {
                    let (remote, added) = remotes
                        .create_with_function(name, &FunctionRef::new(host.as_str(), *port, function.as_str()))
                        .await?;
                    (remote, Some(added))
                }
                _ => (remotes.create(name).await?, None),
            };

            match cli.format {
                OutputFormat::Text => {
                    println!("Created remote '{}' ({})", remote.name, remote.id);
                    if let Some(first) = &first {
                        println!("Added {} on {}", first.function_id, first.device_key());
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "remote": remote,
                        "function": first,
                    }));
                }
            }
        }

        RemoteCommand::Rename { id, name } => {
            let remote = remotes.rename(*id, name).await?;
            match cli.format {
                OutputFormat::Text => println!("Renamed remote {} to '{}'", remote.id, remote.name),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&remote)?),
            }
        }

        RemoteCommand::Delete { id } => {
            let removed = remotes.delete(*id).await?;
            match cli.format {
                OutputFormat::Text => println!("Deleted remote {} ({} functions)", id, removed),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "status": "deleted",
                        "id": id,
                        "functions_removed": removed,
                    }));
                }
            }
        }

        RemoteCommand::Show { id } => {
            let remote = remotes.get(*id).await?;
            let view = session.aggregator().build_view(*id).await?;

            match cli.format {
                OutputFormat::Text => {
                    println!("{}", remote.name);
                    if view.is_empty() {
                        println!();
                        println!("No reachable functions.");
                    }
                    for (device, group) in &view {
                        let status = if group.is_online { "online" } else { "offline" };
                        println!();
                        println!("  {} ({}, {})", group.device_name, device, status);
                        for f in &group.functions {
                            println!("    [{}] {} - {}", f.remote_function_id, f.function.id, f.function.name);
                        }
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "remote": remote,
                        "devices": view,
                    }));
                }
            }
        }

        RemoteCommand::Add {
            id,
            host,
            port,
            function,
        } => {
            let added = remotes
                .add_function(*id, &FunctionRef::new(host.as_str(), *port, function.as_str()))
                .await?;
            match cli.format {
                OutputFormat::Text => println!(
                    "Remote {} has {} on {} ({})",
                    id,
                    added.function_id,
                    added.device_key(),
                    added.id
                ),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&added)?),
            }
        }

        RemoteCommand::Remove { remote_function_id } => {
            remotes.remove_function(*remote_function_id).await?;
            match cli.format {
                OutputFormat::Text => println!("Removed remote function {}", remote_function_id),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "status": "removed",
                        "id": remote_function_id,
                    }));
                }
            }
        }

        RemoteCommand::Toggle {
            id,
            host,
            port,
            function,
        } => {
            let toggled = remotes
                .toggle_function(*id, &FunctionRef::new(host.as_str(), *port, function.as_str()))
                .await?;
            let member = matches!(toggled, Toggled::Added(_));
            match cli.format {
                OutputFormat::Text => {
                    if member {
                        println!("Added {} to remote {}", function, id);
                    } else {
                        println!("Removed {} from remote {}", function, id);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "remote_id": id,
                        "member": member,
                    }));
                }
            }
        }

        RemoteCommand::Memberships { host, port, function } => {
            let list = remotes
                .memberships(&FunctionRef::new(host.as_str(), *port, function.as_str()))
                .await;
            match cli.format {
                OutputFormat::Text => {
                    if list.is_empty() {
                        println!("{} is not on any remote", function);
                    }
                    for remote in &list {
                        println!("  {:4} {}", remote.id, remote.name);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&list)?),
            }
        }

        RemoteCommand::Status { id } => {
            let status = remotes.device_status(*id).await?;
            match cli.format {
                OutputFormat::Text => println!("{}/{} devices online", status.online, status.total),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            }
        }
    }

    Ok(())
}
