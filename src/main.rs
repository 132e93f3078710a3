//! efkreload - Push effect files to a running viewer
//!
//! Command line front end for the reload client.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use efkreload::config::{self, Config};
use efkreload::protocol;
use efkreload::{AssetLoader, Client, FileAssetLoader};

/// efkreload - Live reload for effect viewers
#[derive(Parser)]
#[command(name = "efkreload")]
#[command(author = "efkreload Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Push effect files to a running viewer for live reload", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push one effect file and disconnect
    Push {
        #[command(flatten)]
        target: Target,
    },

    /// Push an effect file every time it changes
    Watch {
        #[command(flatten)]
        target: Target,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[derive(clap::Args)]
struct Target {
    /// Effect file to push
    path: PathBuf,

    /// Key the viewer knows the effect by (defaults to the path)
    #[arg(short, long)]
    key: Option<String>,

    /// Viewer host
    #[arg(long)]
    host: Option<String>,

    /// Viewer port
    #[arg(short, long)]
    port: Option<u16>,
}

impl Target {
    fn key(&self) -> String {
        self.key
            .clone()
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    fn endpoint(&self, config: &Config) -> (String, u16) {
        (
            self.host.clone().unwrap_or_else(|| config.network.host.clone()),
            self.port.unwrap_or(config.network.port),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::new(config.log_filter(cli.verbose)))
        .init();

    match cli.command {
        Commands::Push { target } => {
            run_push(&config, &target).await?;
        }
        Commands::Watch {
            target,
            interval_ms,
        } => {
            let interval = interval_ms.unwrap_or(config.watch.poll_interval_ms);
            run_watch(&config, &target, Duration::from_millis(interval.max(1))).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Push a single file
async fn run_push(config: &Config, target: &Target) -> anyhow::Result<()> {
    let (host, port) = target.endpoint(config);
    let key = target.key();
    let loader = FileAssetLoader::from(&config.assets);

    // Load up front so a bad path is reported instead of skipped
    let asset = loader.load(&target.path).await?;

    let client = Client::new((&config.network).into());
    client.start(&host, port).await?;

    let result = client.reload(&key, &asset).await;
    client.stop().await;
    result?;

    println!("Pushed {} ({} bytes) as '{}'", target.path.display(), asset.len(), key);
    Ok(())
}

/// Push a file whenever its modification time changes
async fn run_watch(config: &Config, target: &Target, interval: Duration) -> anyhow::Result<()> {
    let mut job = WatchJob::new(config, target)?;
    let client = Client::new((&config.network).into());

    println!(
        "Watching {} -> {}:{} as '{}'",
        job.watched.display(),
        job.host,
        job.port,
        job.key
    );
    println!("Press Ctrl+C to stop.\n");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                job.tick(&client).await;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// State carried between polls of a watched file
struct WatchJob {
    host: String,
    port: u16,
    key: String,
    path: PathBuf,
    watched: PathBuf,
    loader: FileAssetLoader,
    /// Modification time of the last version on the wire
    last_pushed: Option<SystemTime>,
}

impl WatchJob {
    fn new(config: &Config, target: &Target) -> anyhow::Result<Self> {
        let (host, port) = target.endpoint(config);
        let loader = FileAssetLoader::from(&config.assets);
        let watched = loader.resolve(&target.path)?;

        Ok(Self {
            host,
            port,
            key: target.key(),
            path: target.path.clone(),
            watched,
            loader,
            last_pushed: None,
        })
    }

    /// Reconnect if needed and push the file if it changed.
    ///
    /// Returns whether a push reached the wire.
    async fn tick(&mut self, client: &Client) -> bool {
        if !client.is_connected() {
            if let Err(e) = client.start(&self.host, self.port).await {
                tracing::debug!("Viewer not reachable: {}", e);
                return false;
            }
            // The viewer may have restarted; push again
            self.last_pushed = None;
        }

        let Some(modified) = modified_time(&self.watched).await else {
            return false;
        };
        if self.last_pushed == Some(modified) {
            return false;
        }

        match client.reload_from(&self.loader, &self.path, &self.key).await {
            Ok(true) => {
                self.last_pushed = Some(modified);
                tracing::info!("Pushed {}", self.watched.display());
                true
            }
            // Unreadable for now, retried on the next tick
            Ok(false) => false,
            Err(e) => {
                tracing::warn!("Push of {} failed: {}", self.watched.display(), e);
                false
            }
        }
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => Some(modified),
        Err(e) => {
            tracing::debug!("Cannot stat {}: {}", path.display(), e);
            None
        }
    }
}

/// Print protocol information
fn print_protocol_info() {
    println!("efkreload Protocol Information");
    println!("==============================\n");

    println!("Default Port: {}", protocol::DEFAULT_PORT);
    println!("Byte Order: {}", protocol::BYTE_ORDER);
    println!("Frame: length:i32 payload:[u8; length]");
    println!("Reload: key_len:i32 key:[u16; key_len] asset:[u8; *]");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["efkreload", "info"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_push_defaults() {
        let cli = Cli::try_parse_from(["efkreload", "push", "Effects/fire.efk"]).unwrap();
        let Commands::Push { target } = cli.command else {
            panic!("expected push");
        };

        let config = Config::default();
        assert_eq!(target.key(), "Effects/fire.efk");
        assert_eq!(
            target.endpoint(&config),
            ("127.0.0.1".to_string(), protocol::DEFAULT_PORT)
        );
    }

    async fn watch_job(dir: &TempDir, port: u16, max_size: u64) -> WatchJob {
        let path = dir.path().join("fire.efk");
        tokio::fs::write(&path, b"fire").await.unwrap();

        let mut config = Config::default();
        config.network.port = port;
        config.assets.max_size_bytes = max_size;

        let target = Target {
            path,
            key: Some("fire".to_string()),
            host: None,
            port: None,
        };
        WatchJob::new(&config, &target).unwrap()
    }

    async fn read_frame(peer: &mut TcpStream) -> Vec<u8> {
        let mut header = [0u8; 4];
        peer.read_exact(&mut header).await.unwrap();
        let mut payload = vec![0u8; i32::from_le_bytes(header) as usize];
        peer.read_exact(&mut payload).await.unwrap();
        payload
    }

    #[tokio::test]
    async fn test_watch_tick_reconnects_and_pushes_again() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut job = watch_job(&dir, port, 1024).await;
        let client = Client::default();

        let (pushed, accepted) = tokio::join!(job.tick(&client), listener.accept());
        assert!(pushed);
        let (mut peer, _) = accepted.unwrap();
        assert!(read_frame(&mut peer).await.ends_with(b"fire"));

        // Unchanged file is not pushed twice
        assert!(!job.tick(&client).await);

        drop(peer);
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let (pushed, accepted) = tokio::join!(job.tick(&client), listener.accept());
        assert!(pushed);
        let (mut peer, _) = accepted.unwrap();
        assert!(read_frame(&mut peer).await.ends_with(b"fire"));
        assert_eq!(client.stats().frames_sent, 2);
    }

    #[tokio::test]
    async fn test_watch_tick_keeps_unloadable_change_pending() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Too small for the file, so every load fails
        let mut job = watch_job(&dir, port, 1).await;
        let client = Client::default();

        let (pushed, accepted) = tokio::join!(job.tick(&client), listener.accept());
        assert!(!pushed);
        let _peer = accepted.unwrap();

        assert!(client.is_connected());
        assert_eq!(job.last_pushed, None);
        assert_eq!(client.stats().frames_sent, 0);

        // Once readable, the same modification is pushed
        job.loader = FileAssetLoader::new();
        assert!(job.tick(&client).await);
        assert!(job.last_pushed.is_some());
    }

    #[test]
    fn test_watch_overrides() {
        let cli = Cli::try_parse_from([
            "efkreload",
            "watch",
            "fire.efk",
            "--key",
            "fire",
            "--host",
            "viewer.local",
            "--port",
            "7000",
            "--interval-ms",
            "100",
        ])
        .unwrap();
        let Commands::Watch {
            target,
            interval_ms,
        } = cli.command
        else {
            panic!("expected watch");
        };

        assert_eq!(target.key(), "fire");
        assert_eq!(
            target.endpoint(&Config::default()),
            ("viewer.local".to_string(), 7000)
        );
        assert_eq!(interval_ms, Some(100));
    }
}
