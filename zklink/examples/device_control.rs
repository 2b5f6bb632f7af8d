//! Device control example

use std::time::Duration;

use anyhow::Context;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use zklink::{Device, DeviceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());

    let mut device = Device::new(DeviceConfig::new(ip.clone()));
    device
        .connect()
        .await
        .with_context(|| format!("connecting to {}", ip))?;

    println!("Device connected!");
    println!("Clock: {}", device.get_time().await?);

    // Disable device (show "Working...")
    println!("Disabling device...");
    device.disable_device().await?;
    sleep(Duration::from_secs(3)).await;

    // Enable device (resume normal operation)
    println!("Enabling device...");
    device.enable_device().await?;

    if std::env::var("UNLOCK").is_ok() {
        println!("Unlocking door for 3s...");
        device.unlock(3).await?;
    }

    println!("Done!");

    device.disconnect().await?;

    Ok(())
}
