//! Broadcast a payload from one module and print what another receives.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p uwblib --example messaging -- /dev/ttyACM0 /dev/ttyACM1
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use uwblib::UwbBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let sender_port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let receiver_port = args.next().unwrap_or_else(|| "/dev/ttyACM1".to_string());

    let sender = UwbBuilder::new().serial_port(&sender_port).build().await?;
    let receiver = UwbBuilder::new().serial_port(&receiver_port).build().await?;

    receiver.on_message(|payload, is_valid| {
        if is_valid {
            println!("received {:?}", String::from_utf8_lossy(payload));
        }
    })?;

    for i in 0..10 {
        let text = format!("hello #{i}");
        sender.broadcast(text.as_bytes()).await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    sender.close().await?;
    receiver.close().await?;
    Ok(())
}
