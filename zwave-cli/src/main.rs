use anyhow::{Context, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use zwave_serial::{
    Controller, ControllerConfig, Unsolicited,
    command::Command,
    link::{self, LinkConfig},
    payload::{CapabilitiesReport, LibraryVersionReport},
};

/// Talk to a Z-Wave controller stick over its serial API.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial device; discovered automatically when omitted.
    #[arg(long)]
    port: Option<String>,

    /// off, error, warn, info, debug or trace. RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn pick_port(requested: Option<String>) -> anyhow::Result<String> {
    if let Some(port) = requested {
        return Ok(port);
    }
    let ports = link::discover().context("port discovery failed")?;
    let Some(port) = ports.first() else {
        bail!("no controller found; pass --port");
    };
    if ports.len() > 1 {
        warn!("several candidate ports {ports:?}, using {port}");
    }
    Ok(port.clone())
}

async fn identify(controller: &Controller) -> anyhow::Result<()> {
    let version: LibraryVersionReport = controller
        .send_and_receive(&Command::GetLibraryVersion)
        .await
        .context("library version query failed")?;
    info!("library: {} ({})", version.version, version.library_type);

    let capabilities: CapabilitiesReport = controller
        .send_and_receive(&Command::GetCapabilities)
        .await
        .context("capabilities query failed")?;
    info!(
        "application {}.{}, manufacturer 0x{:04x}, product type 0x{:04x}, product 0x{:04x}",
        capabilities.application_version,
        capabilities.application_revision,
        capabilities.manufacturer_id,
        capabilities.product_type,
        capabilities.product_id,
    );
    let supported = (1..=u8::MAX)
        .filter(|id| capabilities.supports(*id))
        .count();
    debug!("{supported} serial API functions supported");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn shutdown_requested() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => interrupted,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_requested() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn log_unsolicited(mut unsolicited: Unsolicited) {
    while let Some(frame) = unsolicited.recv().await {
        info!("device sent {frame}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();

    let link_config = LinkConfig::new(pick_port(args.port)?);
    let stream = link::open(&link_config)
        .with_context(|| format!("could not open {}", link_config.path))?;
    info!("connected to {}", link_config.path);

    let config = ControllerConfig {
        read_timeout: link_config.read_timeout,
        ..Default::default()
    };
    let (controller, unsolicited) = Controller::open(stream, config);
    tokio::spawn(log_unsolicited(unsolicited));

    let identified = identify(&controller).await;
    if identified.is_ok() {
        info!("listening for device traffic, ctrl-c to quit");
        shutdown_requested().await?;
        info!("shutting down");
    }

    controller.close().await?;
    identified
}
