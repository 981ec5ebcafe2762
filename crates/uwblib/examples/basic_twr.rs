//! Two-way ranging between two modules.
//!
//! Reads the ID of both modules, then ranges from the first to the second
//! once per second and prints the result.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=uwblib=debug cargo run -p uwblib --example basic_twr -- /dev/ttyACM0 /dev/ttyACM1
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use uwblib::{Error, UwbBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let initiator_port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let target_port = args.next().unwrap_or_else(|| "/dev/ttyACM1".to_string());

    let initiator = UwbBuilder::new().serial_port(&initiator_port).build().await?;
    let target = UwbBuilder::new().serial_port(&target_port).build().await?;

    let initiator_id = initiator.get_id().await?;
    let target_id = target.get_id().await?;
    println!("initiator {initiator_port}: ID {initiator_id}");
    println!("target    {target_port}: ID {target_id}");

    let target_id = u64::try_from(target_id)?;
    for _ in 0..30 {
        match initiator.do_twr(target_id).await {
            Ok(range) => println!("range: {range:.3} m"),
            Err(Error::Timeout) => println!("no reply from initiator"),
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    initiator.close().await?;
    target.close().await?;
    Ok(())
}
