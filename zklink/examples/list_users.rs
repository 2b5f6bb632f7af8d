//! Read device information and the enrolled users

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use zklink::{Device, DeviceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Change to your device IP
    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.201".to_string());
    let password: u32 = match std::env::var("DEVICE_PASSWORD") {
        Ok(value) => value.parse().context("DEVICE_PASSWORD must be a number")?,
        Err(_) => 0,
    };

    let config = DeviceConfig::new(ip)
        .with_password(password)
        .with_force_udp(std::env::var("FORCE_UDP").is_ok());
    let mut device = Device::new(config);

    device.connect().await.context("connect failed")?;

    let info = device.get_device_info().await?;
    println!("{}", info);

    // Stop the terminal from changing the table while it is read
    device.disable_device().await?;
    let listing = device.get_users().await;
    device.enable_device().await?;
    let listing = listing?;

    println!("{}", device);
    for user in &listing.users {
        println!("  {}", user);
    }
    for warning in &listing.warnings {
        println!("  warning: {}", warning);
    }
    println!(
        "next uid: {}, next user id: {}",
        listing.next_uid, listing.next_user_id
    );

    device.disconnect().await?;

    Ok(())
}
