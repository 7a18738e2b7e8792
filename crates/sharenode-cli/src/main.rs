use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use sharenode_core::{ClientConfig, Notice, ShareApi, ShareClient, StoredSession};
use storage::{LocalStore, SnapshotStore};
use transport_ws::WsChannel;

mod http;
use http::{HttpShareApi, HttpUploader};

#[derive(Parser, Debug)]
#[command(name = "sharenode", version, about = "Sharenode ephemeral file sharing")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Data directory for session state and config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the local node configuration
    Init {
        /// Backend base URL
        #[arg(long, default_value = "http://localhost:8080")]
        backend_url: String,

        /// Message channel URL (derived from the backend URL if omitted)
        #[arg(long)]
        channel_url: Option<String>,
    },

    /// Share a file and serve download requests until interrupted
    Share {
        /// File to share
        #[arg(long)]
        file: PathBuf,
    },

    /// Restore the previous session and serve until interrupted
    Run {
        /// Re-attach a recovered share: --attach <share_id>=<path>
        #[arg(long)]
        attach: Vec<String>,
    },

    /// Show the stored session state
    Status,

    /// Look up a share on the backend
    Info {
        /// Share identifier
        #[arg(long)]
        share_id: String,
    },

    /// Withdraw a share
    Unshare {
        /// Share identifier
        #[arg(long)]
        share_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    // Determine data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sharenode")
    });

    match cli.cmd {
        Commands::Init {
            backend_url,
            channel_url,
        } => {
            let mut cfg = ClientConfig::default();
            cfg.data_dir = data_dir.clone();
            cfg.channel_url = channel_url.unwrap_or_else(|| {
                format!("{}/gs-guide-websocket", backend_url.replace("http", "ws"))
            });
            cfg.backend_url = backend_url;
            cfg.ensure_data_dir()?;

            let cfg_path = data_dir.join("config.json");
            let cfg_json = serde_json::to_string_pretty(&cfg)?;
            std::fs::write(&cfg_path, cfg_json)?;

            println!("✓ Node initialized");
            println!("  Backend: {}", cfg.backend_url);
            println!("  Channel: {}", cfg.channel_url);
            println!("  Data directory: {}", data_dir.display());
        }

        Commands::Share { file } => {
            let cfg = load_config(&data_dir)?;
            let (client, mut notices) = build_client(cfg)?;

            let pending = client.restore().await;
            if pending > 0 {
                println!(
                    "! {} recovered file(s) await re-selection; use 'run --attach' to serve them",
                    pending
                );
            }

            if let Err(e) = client.connect().await {
                println!("✗ Channel connection failed: {}", e);
                println!("  The share will be created, but download requests cannot be observed.");
            }

            let share_id = client.share_file(&file).await?;
            println!("  Link: {}", client.download_url(&share_id));
            serve(&client, &mut notices).await;
        }

        Commands::Run { attach } => {
            let cfg = load_config(&data_dir)?;
            let (client, mut notices) = build_client(cfg)?;

            let pending = client.restore().await;
            println!("✓ Session restored ({} share(s) pending)", pending);

            if let Err(e) = client.connect().await {
                println!("✗ Channel connection failed: {}", e);
            }

            for pair in attach {
                let (share_id, path) = parse_attach(&pair)?;
                match client.reattach(&share_id, &path).await {
                    Ok(()) => println!("✓ Re-attached {} -> {}", share_id, path.display()),
                    Err(e) => println!("✗ Could not re-attach {}: {}", share_id, e),
                }
            }

            serve(&client, &mut notices).await;
        }

        Commands::Status => {
            let store = LocalStore::new(data_dir.clone())?;
            let stored = match store.load().await? {
                Some(bytes) => StoredSession::decode(&bytes)?,
                None => StoredSession::default(),
            };

            println!("Stored session ({} share(s)):", stored.shared_files.len());
            for share in &stored.shared_files {
                let pending = stored.pending_files.contains(&share.share_id);
                println!(
                    "\n  {} ({} bytes){}",
                    share.file_name,
                    share.file_size,
                    if pending { "  [awaiting re-selection]" } else { "" }
                );
                println!("    Share: {}", share.share_id);
                for t in &share.transfers {
                    println!(
                        "    - {} [{}] {:.0}%",
                        t.peer_addr,
                        match t.status {
                            sharenode_core::TransferStatus::InProgress => "in progress",
                            sharenode_core::TransferStatus::Succeeded => "succeeded",
                            sharenode_core::TransferStatus::Failed => "failed",
                        },
                        t.progress
                    );
                }
            }
        }

        Commands::Info { share_id } => {
            let cfg = load_config(&data_dir)?;
            let api = HttpShareApi::new(cfg.backend_url.clone());
            match api.get_file_info(&share_id).await? {
                Some(info) => {
                    println!("✓ Share {} is live", share_id);
                    println!("  File: {} ({} bytes)", info.file_name, info.file_size);
                    if !info.file_type.is_empty() {
                        println!("  Type: {}", info.file_type);
                    }
                    println!("  Link: {}", cfg.download_url(&share_id));
                }
                None => {
                    println!("✗ Share {} not found", share_id);
                    std::process::exit(1);
                }
            }
        }

        Commands::Unshare { share_id } => {
            let cfg = load_config(&data_dir)?;
            let (client, _notices) = build_client(cfg)?;
            client.restore().await;
            client.unshare_file(&share_id).await?;
            println!("✓ Share {} withdrawn", share_id);
        }
    }

    Ok(())
}

fn load_config(data_dir: &PathBuf) -> Result<ClientConfig> {
    let cfg_path = data_dir.join("config.json");
    if !cfg_path.exists() {
        anyhow::bail!("Node not initialized. Run 'sharenode init' first.");
    }
    let cfg_json = std::fs::read_to_string(cfg_path)?;
    let cfg: ClientConfig = serde_json::from_str(&cfg_json)?;
    Ok(cfg)
}

fn build_client(cfg: ClientConfig) -> Result<(Arc<ShareClient>, mpsc::Receiver<Notice>)> {
    let store = Arc::new(LocalStore::new(cfg.data_dir.clone()).context("opening session store")?);
    let channel = Arc::new(WsChannel::new(cfg.channel_url.clone()));
    let api = Arc::new(HttpShareApi::new(cfg.backend_url.clone()));
    let uploader = Arc::new(HttpUploader::new(cfg.backend_url.clone()));
    let (notices_tx, notices_rx) = mpsc::channel(64);
    let client = ShareClient::new(cfg, channel, api, uploader, store, notices_tx);
    Ok((client, notices_rx))
}

fn parse_attach(pair: &str) -> Result<(String, PathBuf)> {
    let (share_id, path) = pair
        .split_once('=')
        .context("expected --attach <share_id>=<path>")?;
    Ok((share_id.to_string(), PathBuf::from(path)))
}

async fn serve(client: &Arc<ShareClient>, notices: &mut mpsc::Receiver<Notice>) {
    let mut status = client.status();
    println!("  Press Ctrl+C to stop");

    loop {
        tokio::select! {
            maybe = notices.recv() => match maybe {
                Some(notice) => print_notice(&notice),
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow();
                match current {
                    gateway_core::ConnectionStatus::Connected => println!("✓ Channel connected"),
                    gateway_core::ConnectionStatus::Connecting => println!("… Channel reconnecting"),
                    gateway_core::ConnectionStatus::Error => println!("✗ Channel unavailable"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                client.shutdown().await;
                break;
            }
        }
    }
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::ShareCreated { share_id, file_name } => {
            println!("✓ Sharing {} ({})", file_name, share_id);
        }
        Notice::TransferStarted { peer_addr, .. } => {
            println!("← {} started downloading", peer_addr);
        }
        Notice::TransferComplete { peer_addr, .. } => {
            println!("✓ Transfer to {} complete", peer_addr);
        }
        Notice::TransferFailed { peer_addr, reason, .. } => {
            println!("✗ Transfer to {} failed: {}", peer_addr, reason);
        }
        Notice::FilesAwaitingReselection { count } => {
            println!("! {} file(s) need to be re-selected", count);
        }
        Notice::FileMismatch {
            expected_name,
            expected_size,
            actual_name,
            actual_size,
        } => {
            println!(
                "✗ Selected file does not match: expected {} ({} bytes), got {} ({} bytes)",
                expected_name, expected_size, actual_name, actual_size
            );
        }
    }
}
