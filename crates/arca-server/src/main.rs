//! ARCA Enrollment Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arca_portal::ChromiumLauncher;
use arca_server::{http, AppState, Config, EnrollmentService};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// ARCA/AFIP digital certificate enrollment server.
#[derive(Parser, Debug)]
#[command(name = "arca-server", about = "ARCA certificate enrollment server")]
struct Args {
    /// HTTP server address
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind_addr: String,

    /// Directory where keys, CSRs, certificates and bundles are written
    #[arg(long, default_value = "csrs")]
    work_dir: PathBuf,

    /// Portal landing page
    #[arg(long, default_value = arca_portal::DEFAULT_PORTAL_URL)]
    portal_url: String,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Path to the Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Launch the browser with --no-sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Path to the openssl executable
    #[arg(long, default_value = "openssl")]
    openssl_path: String,

    /// Timeout for each openssl invocation in seconds
    #[arg(long, default_value = "60")]
    tool_timeout_secs: u64,

    /// Maximum concurrent enrollments (browser sessions)
    #[arg(long, default_value = "2")]
    max_concurrent: usize,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind_addr,
            work_dir: args.work_dir,
            portal_url: args.portal_url,
            headless: !args.headful,
            chrome_path: args.chrome_path,
            no_sandbox: args.no_sandbox,
            openssl_path: args.openssl_path,
            tool_timeout_secs: args.tool_timeout_secs,
            max_concurrent_enrollments: args.max_concurrent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca=info".parse()?))
        .with_target(true)
        .init();

    let config = Config::from(Args::parse());
    let addr: SocketAddr = config.bind_addr.parse()?;

    tokio::fs::create_dir_all(&config.work_dir).await?;
    if config.chrome_path.is_none() && arca_portal::find_chrome().is_none() {
        warn!("Chrome/Chromium not found on PATH; enrollments will fail until --chrome-path is set");
    }

    let launcher = Arc::new(ChromiumLauncher::new(config.browser_options()));
    let service = EnrollmentService::new(launcher, &config);
    let state = AppState::new(service);
    let router = http::create_router(state);

    info!(
        addr = %addr,
        work_dir = %config.work_dir.display(),
        portal = %config.portal_url,
        max_concurrent = config.max_concurrent_enrollments,
        "Starting ARCA enrollment server"
    );

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ARCA enrollment server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
