//! Typed helpers for the stock module firmware.
//!
//! The parsers here turn decoded field lists into Rust types. They are pure;
//! the `impl UwbModule` block wires them to [`UwbModule::call`] and
//! [`UwbModule::register`] using the keys from [`uwblib_protocol::specifiers`].
//!
//! These helpers assume the module was built with
//! [`uwb_module()`](uwblib_protocol::uwb_module) or a compatible table; with
//! a different layout they fail with [`Error::MalformedFrame`].

use uwblib_core::{Error, Result};
use uwblib_protocol::specifiers::{
    BROADCAST, CHANNEL_IMPULSE_RESPONSE, DO_TWR, GET_ID, PASSIVE_LISTENING, PAYLOAD_RECEIVED,
    RANGE_AT_TARGET, SET_PASSIVE_LISTENING,
};
use uwblib_protocol::{FieldValue, MessageKey};

use crate::module::UwbModule;
use crate::registry::RegistrationHandle;

/// Options for a two-way ranging exchange (`C05`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwrOptions {
    /// Double-sided ranging: three messages instead of two, cancelling
    /// clock offset between the modules.
    pub ds_twr: bool,
    /// Also report the measurement at the target as an `S01` message.
    pub meas_at_target: bool,
    /// Report the channel impulse response as an `S04` message.
    pub get_cir: bool,
}

impl TwrOptions {
    /// Double-sided ranging with the result also reported at the target.
    pub const DS_AT_TARGET: TwrOptions = TwrOptions {
        ds_twr: true,
        meas_at_target: true,
        get_cir: false,
    };

    fn fields(self, target: u64) -> [FieldValue; 4] {
        [
            FieldValue::UInt(target),
            FieldValue::Bool(self.ds_twr),
            FieldValue::Bool(self.meas_at_target),
            FieldValue::Bool(self.get_cir),
        ]
    }
}

/// A range measurement reported at the target of a two-way ranging exchange
/// (`S01`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMeasurement {
    /// ID of the module that initiated the ranging.
    pub neighbour: i64,
    /// Measured distance in metres.
    pub range: f32,
    /// Transmit timestamps of the three ranging messages.
    pub tx: [i64; 3],
    /// Receive timestamps of the three ranging messages.
    pub rx: [i64; 3],
    /// First-path power of the two messages received by this module.
    pub fpp: [f32; 2],
    /// Clock skew estimates for the two received messages.
    pub skew: [f32; 2],
}

impl RangeMeasurement {
    /// The firmware reports a zero first timestamp when ranging failed.
    pub fn is_valid(&self) -> bool {
        self.tx[0] != 0
    }
}

/// A ranging exchange between two other modules, overheard while passive
/// listening is enabled (`S02`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassiveMeasurement {
    pub from: u64,
    pub to: u64,
    /// Receive timestamps of the three ranging messages at this module.
    pub rx: [i64; 3],
    /// Transmit timestamps reported by the ranging pair.
    pub neighbour_tx: [i64; 3],
    /// Receive timestamps reported by the ranging pair.
    pub neighbour_rx: [i64; 3],
    pub fpp: [f32; 3],
    pub skew: [f32; 3],
    pub neighbour_fpp: [f32; 2],
    pub neighbour_skew: [f32; 2],
}

impl PassiveMeasurement {
    pub fn is_valid(&self) -> bool {
        self.rx[0] != 0
    }
}

/// A channel impulse response captured during ranging (`S04`).
#[derive(Debug, Clone, PartialEq)]
pub struct CirMeasurement {
    pub from: u64,
    pub to: u64,
    /// First-path index in accumulator samples, with a fractional part.
    pub first_path_index: f64,
    /// Accumulator samples as sent by the module.
    pub samples: Vec<u8>,
}

fn field<'a>(key: MessageKey, fields: &'a [FieldValue], index: usize) -> Result<&'a FieldValue> {
    fields
        .get(index)
        .ok_or_else(|| Error::MalformedFrame(format!("{key}: missing field {index}")))
}

fn mismatch(key: MessageKey, index: usize, expected: &str, found: &FieldValue) -> Error {
    Error::MalformedFrame(format!(
        "{key}: field {index} is {}, expected {expected}",
        found.describe()
    ))
}

fn int_field(key: MessageKey, fields: &[FieldValue], index: usize) -> Result<i64> {
    let value = field(key, fields, index)?;
    value.as_i64().ok_or_else(|| mismatch(key, index, "int", value))
}

fn uint_field(key: MessageKey, fields: &[FieldValue], index: usize) -> Result<u64> {
    let value = field(key, fields, index)?;
    value.as_u64().ok_or_else(|| mismatch(key, index, "uint", value))
}

fn float_field(key: MessageKey, fields: &[FieldValue], index: usize) -> Result<f32> {
    let value = field(key, fields, index)?;
    value.as_f32().ok_or_else(|| mismatch(key, index, "float", value))
}

fn bool_field(key: MessageKey, fields: &[FieldValue], index: usize) -> Result<bool> {
    let value = field(key, fields, index)?;
    value.as_bool().ok_or_else(|| mismatch(key, index, "bool", value))
}

fn bytes_field(key: MessageKey, fields: &[FieldValue], index: usize) -> Result<&[u8]> {
    let value = field(key, fields, index)?;
    value.as_bytes().ok_or_else(|| mismatch(key, index, "bytes", value))
}

/// `N` consecutive int fields starting at `first`, `step` apart.
fn ints<const N: usize>(
    key: MessageKey,
    fields: &[FieldValue],
    first: usize,
    step: usize,
) -> Result<[i64; N]> {
    let mut out = [0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = int_field(key, fields, first + i * step)?;
    }
    Ok(out)
}

fn floats<const N: usize>(key: MessageKey, fields: &[FieldValue], first: usize) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = float_field(key, fields, first + i)?;
    }
    Ok(out)
}

// ---------------------------------------------------------------
// Response parsers
// ---------------------------------------------------------------

/// Parse an `R01` reply into the module ID.
pub fn parse_id_response(fields: &[FieldValue]) -> Result<i64> {
    int_field(GET_ID.reply(), fields, 0)
}

/// Parse an `R05` reply into the measured range in metres.
pub fn parse_twr_response(fields: &[FieldValue]) -> Result<f32> {
    float_field(DO_TWR.reply(), fields, 0)
}

/// Parse an `S01` message.
pub fn parse_range_measurement(fields: &[FieldValue]) -> Result<RangeMeasurement> {
    let key = RANGE_AT_TARGET;
    Ok(RangeMeasurement {
        neighbour: int_field(key, fields, 0)?,
        range: float_field(key, fields, 1)?,
        tx: ints(key, fields, 2, 2)?,
        rx: ints(key, fields, 3, 2)?,
        fpp: floats(key, fields, 8)?,
        skew: floats(key, fields, 10)?,
    })
}

/// Parse an `S02` message.
pub fn parse_passive_measurement(fields: &[FieldValue]) -> Result<PassiveMeasurement> {
    let key = PASSIVE_LISTENING;
    Ok(PassiveMeasurement {
        from: uint_field(key, fields, 0)?,
        to: uint_field(key, fields, 1)?,
        rx: ints(key, fields, 2, 1)?,
        neighbour_tx: ints(key, fields, 5, 2)?,
        neighbour_rx: ints(key, fields, 6, 2)?,
        fpp: floats(key, fields, 11)?,
        skew: floats(key, fields, 14)?,
        neighbour_fpp: floats(key, fields, 17)?,
        neighbour_skew: floats(key, fields, 19)?,
    })
}

/// Parse an `S03` message into its payload and validity flag.
pub fn parse_payload(fields: &[FieldValue]) -> Result<(&[u8], bool)> {
    Ok((
        bytes_field(PAYLOAD_RECEIVED, fields, 0)?,
        bool_field(PAYLOAD_RECEIVED, fields, 1)?,
    ))
}

/// Parse an `S04` message.
pub fn parse_cir(fields: &[FieldValue]) -> Result<CirMeasurement> {
    let key = CHANNEL_IMPULSE_RESPONSE;
    let whole = int_field(key, fields, 2)?;
    let thousandths = int_field(key, fields, 3)?;
    Ok(CirMeasurement {
        from: uint_field(key, fields, 0)?,
        to: uint_field(key, fields, 1)?,
        first_path_index: whole as f64 + thousandths as f64 / 1e3,
        samples: bytes_field(key, fields, 4)?.to_vec(),
    })
}

// ---------------------------------------------------------------
// Module helpers
// ---------------------------------------------------------------

impl UwbModule {
    /// Read the module's ID (`C01`).
    pub async fn get_id(&self) -> Result<i64> {
        let reply = self
            .call(GET_ID, &[], self.config().command_timeout)
            .await?;
        parse_id_response(&reply.fields)
    }

    /// Perform single-sided two-way ranging with module `target` (`C05`)
    /// and return the distance in metres.
    pub async fn do_twr(&self, target: u64) -> Result<f32> {
        self.do_twr_with(target, TwrOptions::default()).await
    }

    /// Perform two-way ranging with module `target` using `options`.
    pub async fn do_twr_with(&self, target: u64, options: TwrOptions) -> Result<f32> {
        let reply = self
            .call(DO_TWR, &options.fields(target), self.config().command_timeout)
            .await?;
        parse_twr_response(&reply.fields)
    }

    /// Enable or disable passive listening (`C03`).
    pub async fn set_passive_listening(&self, enabled: bool) -> Result<()> {
        self.call(
            SET_PASSIVE_LISTENING,
            &[FieldValue::Bool(enabled)],
            self.config().command_timeout,
        )
        .await?;
        Ok(())
    }

    /// Broadcast `payload` to every module in range (`C04`).
    pub async fn broadcast(&self, payload: &[u8]) -> Result<()> {
        self.call(
            BROADCAST,
            &[FieldValue::from(payload)],
            self.config().command_timeout,
        )
        .await?;
        Ok(())
    }

    /// Call `handler` for every range measurement reported to this module
    /// as a ranging target.
    pub fn on_range<F>(&self, handler: F) -> Result<RegistrationHandle>
    where
        F: Fn(RangeMeasurement) + Send + Sync + 'static,
    {
        self.register(
            RANGE_AT_TARGET,
            move |fields: &[FieldValue], _: &[FieldValue]| {
                handler(parse_range_measurement(fields)?);
                Ok(())
            },
            Vec::new(),
        )
    }

    /// Call `handler` for every overheard ranging exchange.
    pub fn on_passive<F>(&self, handler: F) -> Result<RegistrationHandle>
    where
        F: Fn(PassiveMeasurement) + Send + Sync + 'static,
    {
        self.register(
            PASSIVE_LISTENING,
            move |fields: &[FieldValue], _: &[FieldValue]| {
                handler(parse_passive_measurement(fields)?);
                Ok(())
            },
            Vec::new(),
        )
    }

    /// Call `handler` with every broadcast payload received and the
    /// module's validity flag for it.
    pub fn on_message<F>(&self, handler: F) -> Result<RegistrationHandle>
    where
        F: Fn(&[u8], bool) + Send + Sync + 'static,
    {
        self.register(
            PAYLOAD_RECEIVED,
            move |fields: &[FieldValue], _: &[FieldValue]| {
                let (payload, is_valid) = parse_payload(fields)?;
                handler(payload, is_valid);
                Ok(())
            },
            Vec::new(),
        )
    }

    /// Call `handler` for every channel impulse response, requested with
    /// [`TwrOptions::get_cir`].
    pub fn on_cir<F>(&self, handler: F) -> Result<RegistrationHandle>
    where
        F: Fn(CirMeasurement) + Send + Sync + 'static,
    {
        self.register(
            CHANNEL_IMPULSE_RESPONSE,
            move |fields: &[FieldValue], _: &[FieldValue]| {
                handler(parse_cir(fields)?);
                Ok(())
            },
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uwblib_test_harness::MockTransport;

    use crate::builder::UwbBuilder;

    const RANGE_FRAME: &[u8] =
        b"S01,4,0.750000,100,101,200,201,300,301,-80.500000,-81.000000,0.250000,0.500000\r";
    const PASSIVE_FRAME: &[u8] =
        b"S02,1,2,10,20,30,11,12,21,22,31,32,-80.0,-81.0,-82.0,0.1,0.2,0.3,-70.0,-71.0,1.5,2.5\r";

    async fn module_with(mock: MockTransport) -> UwbModule {
        UwbBuilder::new()
            .poll_interval(Duration::from_millis(20))
            .command_timeout(Duration::from_secs(2))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap()
    }

    fn decode(raw: &[u8]) -> Vec<FieldValue> {
        uwblib_protocol::decode(&uwblib_protocol::uwb_module(), raw)
            .unwrap()
            .fields
    }

    #[test]
    fn parse_range_measurement_fields() {
        let m = parse_range_measurement(&decode(RANGE_FRAME)).unwrap();
        assert_eq!(
            m,
            RangeMeasurement {
                neighbour: 4,
                range: 0.75,
                tx: [100, 200, 300],
                rx: [101, 201, 301],
                fpp: [-80.5, -81.0],
                skew: [0.25, 0.5],
            }
        );
        assert!(m.is_valid());
    }

    #[test]
    fn parse_passive_measurement_fields() {
        let m = parse_passive_measurement(&decode(PASSIVE_FRAME)).unwrap();
        assert_eq!(m.from, 1);
        assert_eq!(m.to, 2);
        assert_eq!(m.rx, [10, 20, 30]);
        assert_eq!(m.neighbour_tx, [11, 21, 31]);
        assert_eq!(m.neighbour_rx, [12, 22, 32]);
        assert_eq!(m.fpp, [-80.0, -81.0, -82.0]);
        assert_eq!(m.skew, [0.1, 0.2, 0.3]);
        assert_eq!(m.neighbour_fpp, [-70.0, -71.0]);
        assert_eq!(m.neighbour_skew, [1.5, 2.5]);
        assert!(m.is_valid());
    }

    #[test]
    fn zero_timestamp_marks_failed_ranging() {
        let mut fields = decode(RANGE_FRAME);
        fields[2] = FieldValue::Int(0);
        assert!(!parse_range_measurement(&fields).unwrap().is_valid());
    }

    #[test]
    fn parse_cir_fields() {
        let m = parse_cir(&decode(b"S04,3,4,745,250,0a0bff\r")).unwrap();
        assert_eq!(m.from, 3);
        assert_eq!(m.to, 4);
        assert_eq!(m.first_path_index, 745.25);
        assert_eq!(m.samples, vec![0x0a, 0x0b, 0xff]);
    }

    #[test]
    fn parse_errors_name_the_key() {
        let err = parse_range_measurement(&[FieldValue::Int(3)]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(ref m) if m.starts_with("S01")));

        let err = parse_twr_response(&[FieldValue::Text("x".into())]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(ref m) if m.contains("expected float")));
    }

    #[test]
    fn twr_options_field_order() {
        let options = TwrOptions {
            ds_twr: true,
            meas_at_target: false,
            get_cir: true,
        };
        assert_eq!(
            options.fields(7),
            [
                FieldValue::UInt(7),
                FieldValue::Bool(true),
                FieldValue::Bool(false),
                FieldValue::Bool(true),
            ]
        );
    }

    #[tokio::test]
    async fn get_id_round_trip() {
        let mock = MockTransport::new();
        mock.expect(b"C01\r", b"R01,7\r");
        let module = module_with(mock).await;

        assert_eq!(module.get_id().await.unwrap(), 7);
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn do_twr_round_trip() {
        let mock = MockTransport::new();
        mock.expect(b"C05,2,0,0,0\r", b"R05,3.250000\r");
        mock.expect(b"C05,2,1,1,0\r", b"R05,3.500000\r");
        let module = module_with(mock).await;

        assert_eq!(module.do_twr(2).await.unwrap(), 3.25);
        assert_eq!(
            module.do_twr_with(2, TwrOptions::DS_AT_TARGET).await.unwrap(),
            3.5
        );
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn set_passive_listening_and_broadcast_encode() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        mock.expect(b"C03,1\r", b"R03\r");
        mock.expect(b"C04,48690a\r", b"R04\r");
        let module = module_with(mock).await;

        module.set_passive_listening(true).await.unwrap();
        module.broadcast(b"Hi\n").await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);
        module.stop().await.unwrap();
    }

    #[tokio::test]
    async fn typed_callbacks_receive_parsed_values() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let module = module_with(mock).await;

        let ranges = Arc::new(Mutex::new(Vec::new()));
        let passive = Arc::new(Mutex::new(Vec::new()));
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let cirs = Arc::new(Mutex::new(Vec::new()));
        {
            let ranges = ranges.clone();
            module.on_range(move |m| ranges.lock().unwrap().push(m)).unwrap();
        }
        {
            let passive = passive.clone();
            module.on_passive(move |m| passive.lock().unwrap().push(m)).unwrap();
        }
        {
            let payloads = payloads.clone();
            module
                .on_message(move |p, valid| payloads.lock().unwrap().push((p.to_vec(), valid)))
                .unwrap();
        }
        {
            let cirs = cirs.clone();
            module.on_cir(move |m| cirs.lock().unwrap().push(m)).unwrap();
        }

        handle.inject(RANGE_FRAME);
        handle.inject(PASSIVE_FRAME);
        handle.inject(b"S04,1,2,3,500,00\rS03,cafe,1\r");

        let mut state = module.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            while payloads.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(ranges.lock().unwrap()[0].neighbour, 4);
        assert_eq!(passive.lock().unwrap()[0].rx, [10, 20, 30]);
        assert_eq!(cirs.lock().unwrap()[0].first_path_index, 3.5);
        assert_eq!(*payloads.lock().unwrap(), vec![(vec![0xca, 0xfe], true)]);

        module.stop().await.unwrap();
        assert!(state.borrow_and_update().is_stopped());
    }
}
