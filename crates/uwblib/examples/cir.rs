//! Range between two modules and print the channel impulse response each
//! of them reports.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p uwblib --example cir -- /dev/ttyACM0 /dev/ttyACM1
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use uwblib::{TwrOptions, UwbBuilder};

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

    for module in [&initiator, &target] {
        let id = module.get_id().await?;
        module.set_passive_listening(true).await?;
        module.on_cir(move |cir| {
            println!(
                "[{id}] CIR {} -> {}: first path at {:.3}, {} bytes",
                cir.from,
                cir.to,
                cir.first_path_index,
                cir.samples.len()
            );
        })?;
    }

    let target_id = u64::try_from(target.get_id().await?)?;
    let options = TwrOptions {
        ds_twr: true,
        get_cir: true,
        ..TwrOptions::default()
    };
    for _ in 0..20 {
        let range = initiator.do_twr_with(target_id, options).await?;
        println!("range: {range:.3} m");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    initiator.close().await?;
    target.close().await?;
    Ok(())
}
