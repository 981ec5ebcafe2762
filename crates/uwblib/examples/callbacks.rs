//! Receive range measurements at the ranging target and overheard ranging
//! on a third, passively listening module.
//!
//! ```text
//! initiator <----> target        listener (passive)
//! ```
//!
//! # Usage
//!
//! ```sh
//! cargo run -p uwblib --example callbacks -- /dev/ttyACM0 /dev/ttyACM1 /dev/ttyACM2
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use uwblib::{TwrOptions, UwbBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ports: Vec<String> = std::env::args().skip(1).collect();
    let [initiator_port, target_port, listener_port] = ports.as_slice() else {
        anyhow::bail!("usage: callbacks <initiator> <target> <listener>");
    };

    let initiator = UwbBuilder::new().serial_port(initiator_port).build().await?;
    let target = UwbBuilder::new().serial_port(target_port).build().await?;
    let listener = UwbBuilder::new().serial_port(listener_port).build().await?;

    let target_id = target.get_id().await?;
    let listener_id = listener.get_id().await?;

    target.on_range(move |m| {
        if m.is_valid() {
            println!(
                "[{target_id}] {:.3} m from {} (fpp {:?}, skew {:?})",
                m.range, m.neighbour, m.fpp, m.skew
            );
        }
    })?;

    listener.set_passive_listening(true).await?;
    listener.on_passive(move |m| {
        if m.is_valid() {
            println!(
                "[{listener_id}] overheard {} -> {}: rx {:?}, neighbour tx {:?}",
                m.from, m.to, m.rx, m.neighbour_tx
            );
        }
    })?;

    let target_id = u64::try_from(target_id)?;
    for _ in 0..60 {
        if let Err(e) = initiator
            .do_twr_with(target_id, TwrOptions::DS_AT_TARGET)
            .await
        {
            tracing::warn!(error = %e, "ranging failed");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    listener.set_passive_listening(false).await?;
    for module in [&initiator, &target, &listener] {
        module.close().await?;
    }
    Ok(())
}
