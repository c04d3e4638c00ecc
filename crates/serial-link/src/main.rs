//! Frame Monitor - logs every frame received on a serial port

use anyhow::Context;
use serial_link::{init_logging, open_port, FrameLink, LinkConfig, LinkError};
use std::path::PathBuf;
use tracing::{error, info, warn};

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Frame Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = LinkConfig::load(config_path.as_deref()).context("loading link configuration")?;
    let port = open_port(&config).with_context(|| format!("opening {}", config.device))?;
    let mut link = FrameLink::start(port, &config)?;

    loop {
        tokio::select! {
            frame = link.next_frame() => match frame {
                Some(Ok(frame)) => info!("Frame ({} bytes): {}", frame.len(), hex(&frame)),
                Some(Err(e @ LinkError::Decode(_))) => warn!("Discarding frame: {}", e),
                Some(Err(e)) => error!("Link failed: {}", e),
                None => {
                    warn!("Serial port closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let report = link.shutdown().await?;
    info!("Link report: {}", serde_json::to_string(&report)?);
    Ok(())
}
