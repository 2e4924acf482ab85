use lib::kiosk::{doctor_source, events, helpers, models, run_tool, surface};

use std::time::Duration;

use clap::Parser;
use doctor_source::PortalClient;
use events::PushListener;
use helpers::{get_bootstrap, get_config};
use log::{error, info};
use models::Args;
use run_tool::run;
use surface::HtmlFileSurface;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    /* Setup logging */
    env_logger::builder()
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    /* Get all the required resources */
    let args = Args::parse();
    let config = match get_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Cannot read config: {}", e);
            std::process::exit(1);
        }
    };
    let bootstrap = match get_bootstrap(&args) {
        Ok(bootstrap) => bootstrap,
        Err(e) => {
            error!("Cannot read bootstrap snapshot: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = config
        .output_html_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        if !dir.is_dir() {
            error!("Output directory {} does not exist", dir.display());
            std::process::exit(1);
        }
    }
    let portal = match PortalClient::new(
        &config.server_url,
        Duration::from_secs(config.request_timeout_secs),
    ) {
        Ok(portal) => portal,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    /* The push stream stays open for hours, so no overall request timeout here */
    let stream_client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Cannot build push stream client: {}", e);
            std::process::exit(1);
        }
    };
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let listener = PushListener::new(
        stream_client,
        portal.url("/events"),
        Duration::from_millis(config.sse_initial_retry_ms),
        Duration::from_millis(config.sse_max_retry_ms),
        config.sse_max_retries,
    );
    let listener_handle = tokio::spawn(listener.run(push_tx));

    /* Rotate slides until Ctrl+C */
    info!(
        "Rendering patient display into {}",
        config.output_html_path.display()
    );
    let surface = HtmlFileSurface::new(&config.output_html_path);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };
    run(portal, surface, push_rx, bootstrap, &config, shutdown).await;

    listener_handle.abort();
}
