//! Entry point for `rdp`.
//!
//! Parses CLI arguments and dispatches into **server**, **upload** or
//! **download** mode.  All protocol and file work is delegated to library
//! modules; `main.rs` owns only process setup (logging, argument parsing).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use rdp::simulator::SimulatorConfig;
use rdp::{transfer, Config, Listener};

/// File transfer over a reliable transport on UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct Common {
    /// Service IP address.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Service port.
    #[arg(short, long, default_value_t = 12000)]
    port: u16,
    /// Increase output verbosity.
    #[arg(short, long)]
    verbose: bool,
    /// Decrease output verbosity.
    #[arg(short, long)]
    quiet: bool,
    /// Segments in flight per message.
    #[arg(short, long, default_value_t = rdp::config::DEFAULT_WINDOW)]
    window: usize,
    /// Probability of dropping each outbound datagram.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
}

impl Common {
    fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    fn config(&self) -> Config {
        Config {
            window_size: self.window,
            verbose: self.verbose && !self.quiet,
            faults: SimulatorConfig {
                loss_rate: self.loss,
                ..SimulatorConfig::default()
            },
            ..Config::default()
        }
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from a storage directory.
    Server {
        #[command(flatten)]
        common: Common,
        /// Storage directory.
        #[arg(short, long, default_value = "storage")]
        storage: PathBuf,
    },
    /// Upload a file to the server.
    Upload {
        #[command(flatten)]
        common: Common,
        /// Source directory.
        #[arg(short, long, default_value = ".")]
        src: PathBuf,
        /// File name.
        #[arg(short, long)]
        name: String,
    },
    /// Download a file from the server.
    Download {
        #[command(flatten)]
        common: Common,
        /// Destination directory.
        #[arg(short, long, default_value = ".")]
        dst: PathBuf,
        /// File name.
        #[arg(short, long)]
        name: String,
    },
}

impl Mode {
    fn common(&self) -> &Common {
        match self {
            Mode::Server { common, .. }
            | Mode::Upload { common, .. }
            | Mode::Download { common, .. } => common,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins; -v only raises the default so observer lines show.
    let default_filter = if cli.mode.common().config().verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.mode {
        Mode::Server { common, storage } => {
            let listener = Listener::bind(common.addr(), common.config())
                .await
                .with_context(|| format!("binding {}", common.addr()))?;
            log::info!("Serving {} on {}", storage.display(), common.addr());
            transfer::serve(listener, storage).await?;
        }
        Mode::Upload { common, src, name } => {
            transfer::upload(common.addr(), common.config(), &src, &name)
                .await
                .with_context(|| format!("uploading {name}"))?;
            log::info!("Uploaded {name}");
        }
        Mode::Download { common, dst, name } => {
            let path = transfer::download(common.addr(), common.config(), &dst, &name)
                .await
                .with_context(|| format!("downloading {name}"))?;
            log::info!("Downloaded {name} to {}", path.display());
        }
    }
    Ok(())
}
