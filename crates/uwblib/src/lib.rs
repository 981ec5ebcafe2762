//! # uwblib -- host-side driver for UWB ranging modules
//!
//! `uwblib` talks to an ultra-wideband module over its serial line protocol.
//! Commands are sent and their replies awaited with a timeout; unsolicited
//! messages (range measurements, overheard ranging, broadcast payloads) are
//! delivered to registered callbacks on a dedicated thread.
//!
//! ## Quick Start
//!
//! ```no_run
//! use uwblib::UwbBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let module = UwbBuilder::new().serial_port("/dev/ttyACM0").build().await?;
//!
//!     println!("module ID: {}", module.get_id().await?);
//!     println!("range to 2: {:.3} m", module.do_twr(2).await?);
//!
//!     module.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire format
//!
//! ```text
//! <C|R|S><id:2 digits>[,<field>]*\r
//! ```
//!
//! `C` messages are commands, `R` their replies (same ID), `S` unsolicited.
//! Field layouts come from a [`SpecifierTable`]; the stock firmware table is
//! [`uwb_module()`].
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                            |
//! |-----------------------|----------------------------------------------------|
//! | `uwblib-core`         | [`Error`], [`Result`], the [`Transport`] trait      |
//! | `uwblib-protocol`     | Message types, specifiers, codec, frame extractor  |
//! | `uwblib-io`           | Reader/dispatcher loops, [`UwbModule`], builder    |
//! | `uwblib-transport`    | Serial transport                                   |
//! | `uwblib-test-harness` | Mock transport for tests                           |
//! | **`uwblib`**          | This facade crate -- re-exports everything         |
//!
//! ## Callbacks
//!
//! ```no_run
//! use uwblib::{FieldValue, UwbModule, specifiers};
//! # fn example(module: &UwbModule) -> uwblib::Result<()> {
//! module.on_range(|m| println!("{} m from {}", m.range, m.neighbour))?;
//!
//! // Raw registration with bound extra arguments.
//! module.register(
//!     specifiers::PAYLOAD_RECEIVED,
//!     |fields: &[FieldValue], extra: &[FieldValue]| {
//!         println!("{:?} payload {:?}", extra[0], fields[0]);
//!         Ok(())
//!     },
//!     vec![FieldValue::from("anchor-a")],
//! )?;
//! # Ok(())
//! # }
//! ```

pub use uwblib_core::*;

pub use uwblib_protocol::{
    BlobEncoding, FieldType, FieldValue, Frame, FrameExtractor, MessageClass, MessageKey,
    SpecifierTable, SpecifierTableBuilder, codec, specifiers, uwb_module,
};

pub use uwblib_io::{
    Callback, CirMeasurement, LoopState, ModuleConfig, ModuleState, PassiveMeasurement,
    RangeMeasurement, RegistrationHandle, TwrOptions, UwbBuilder, UwbModule,
};

/// Serial transport for a locally attached module.
pub mod serial {
    pub use uwblib_transport::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use uwblib_test_harness::MockTransport;

    #[tokio::test]
    async fn ranging_through_the_facade() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        mock.expect(b"C01\r", b"R01,3\r");
        mock.expect(b"C05,7,1,1,0\r", b"R05,2.500000\r");

        let module = UwbBuilder::new()
            .specifiers(uwb_module())
            .poll_interval(Duration::from_millis(20))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        assert!(module.is_running());

        let (tx, rx) = mpsc::channel();
        module
            .on_message(move |payload, valid| {
                let _ = tx.send((payload.to_vec(), valid));
            })
            .unwrap();

        assert_eq!(module.get_id().await.unwrap(), 3);
        assert_eq!(
            module.do_twr_with(7, TwrOptions::DS_AT_TARGET).await.unwrap(),
            2.5
        );

        handle.inject(b"S03,6f6b,1\r");
        let received = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, (b"ok".to_vec(), true));

        module.close().await.unwrap();
        assert_eq!(module.reader_state(), LoopState::Stopped);
        assert!(matches!(module.start().await, Err(Error::NotConnected)));
    }
}
