//! httpserver - serve GET/PUT on files under a document root
//!
//! ```text
//! httpserver [-t THREADS] <PORT>
//! ```
//!
//! Environment: `RWFS_ROOT`, `RWFS_QUEUE_CAPACITY`, `RWFS_READER_BATCH`,
//! `RWFS_BUCKETS`, `RWFS_FLUSH_AUDIT`, `RWFS_WORKERS` (below `-t`), and
//! `RWFS_LOG` for the log filter.

use std::num::NonZeroUsize;

use anyhow::Context;
use clap::Parser;
use rwfs_server::{Server, ServerConfig, ServerError};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "httpserver", version, about)]
struct Args {
    /// Worker threads
    #[arg(short = 't', long = "threads", value_name = "THREADS")]
    threads: Option<NonZeroUsize>,

    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env().port(self.port);
        if let Some(threads) = self.threads {
            config = config.workers(threads.get());
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RWFS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let server = match Server::bind(args.config()) {
        Err(e @ ServerError::Bind { .. }) => return Err(anyhow::Error::new(e).context("Invalid Port")),
        other => other.context("server startup failed")?,
    };
    server.run()?;
    server.shutdown();
    Ok(())
}
