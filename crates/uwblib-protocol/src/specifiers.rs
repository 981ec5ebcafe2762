//! Message format specifiers.
//!
//! A [`SpecifierTable`] maps every known [`MessageKey`] to the ordered list
//! of [`FieldType`]s its body carries. The table is built once, shared
//! read-only between the codec, the reader loop and the command invoker,
//! and never mutated afterwards.
//!
//! The table for the stock module firmware is provided by [`uwb_module()`]:
//!
//! | Key | Fields                                   | Meaning                        |
//! |-----|------------------------------------------|--------------------------------|
//! | C01 | --                                       | read module ID                 |
//! | R01 | int                                      | module ID                      |
//! | C03 | bool                                     | toggle passive listening       |
//! | R03 | --                                       | acknowledge                    |
//! | C04 | hex bytes                                | broadcast a payload            |
//! | R04 | --                                       | acknowledge                    |
//! | C05 | uint, bool, bool, bool                   | ranging: target, double-sided, report at target, request CIR |
//! | R05 | float                                    | measured range in metres       |
//! | S01 | int, float, 6 x int, 4 x float           | range measured at target       |
//! | S02 | 2 x uint, 9 x int, 10 x float            | passively overheard ranging    |
//! | S03 | hex bytes, bool                          | payload received, valid flag   |
//! | S04 | 2 x uint, 2 x int, hex bytes             | channel impulse response       |
//!
//! `S01` carries the neighbour ID, the range, three tx/rx timestamp pairs,
//! two first-path powers and two clock skews. `S02` carries the initiator and
//! target IDs, the listener's three rx timestamps, the neighbour's three
//! tx/rx pairs, three first-path powers, three skews, and the neighbour's two
//! first-path powers and two skews. `S04` carries the two IDs, the integer
//! and thousandths parts of the first-path index, and the raw accumulator
//! samples.

use std::collections::HashMap;

use uwblib_core::{Error, Result};

use crate::types::{BlobEncoding, FieldType, MessageKey};

/// `C01`: read the module ID.
pub const GET_ID: MessageKey = MessageKey::command(1);
/// `C03`: enable or disable passive listening.
pub const SET_PASSIVE_LISTENING: MessageKey = MessageKey::command(3);
/// `C04`: broadcast a payload to every module in range.
pub const BROADCAST: MessageKey = MessageKey::command(4);
/// `C05`: perform two-way ranging with a target module.
pub const DO_TWR: MessageKey = MessageKey::command(5);
/// `S01`: range measurement made available at the ranging target.
pub const RANGE_AT_TARGET: MessageKey = MessageKey::spontaneous(1);
/// `S02`: ranging transaction overheard while passively listening.
pub const PASSIVE_LISTENING: MessageKey = MessageKey::spontaneous(2);
/// `S03`: broadcast payload received from another module.
pub const PAYLOAD_RECEIVED: MessageKey = MessageKey::spontaneous(3);
/// `S04`: channel impulse response captured during ranging.
pub const CHANNEL_IMPULSE_RESPONSE: MessageKey = MessageKey::spontaneous(4);

/// Immutable mapping from message key to field layout.
#[derive(Debug, Clone, Default)]
pub struct SpecifierTable {
    entries: HashMap<MessageKey, Vec<FieldType>>,
}

impl SpecifierTable {
    /// Start building a custom table.
    pub fn builder() -> SpecifierTableBuilder {
        SpecifierTableBuilder::default()
    }

    /// Field layout for `key`, if registered.
    pub fn get(&self, key: MessageKey) -> Option<&[FieldType]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// Field layout for `key`, or [`Error::UnknownMessageId`].
    pub fn lookup(&self, key: MessageKey) -> Result<&[FieldType]> {
        self.get(key)
            .ok_or_else(|| Error::UnknownMessageId(key.to_string()))
    }

    pub fn contains(&self, key: MessageKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = MessageKey> + '_ {
        self.entries.keys().copied()
    }
}

/// Builder for [`SpecifierTable`].
///
/// Duplicate keys and IDs above 99 are rejected by [`build`](Self::build),
/// so a bad table fails at startup rather than on the first frame.
#[derive(Debug, Default)]
pub struct SpecifierTableBuilder {
    entries: Vec<(MessageKey, Vec<FieldType>)>,
}

impl SpecifierTableBuilder {
    /// Register a layout for an arbitrary key.
    pub fn entry(mut self, key: MessageKey, fields: &[FieldType]) -> Self {
        self.entries.push((key, fields.to_vec()));
        self
    }

    /// Register a `C` command layout.
    pub fn command(self, id: u8, fields: &[FieldType]) -> Self {
        self.entry(MessageKey::command(id), fields)
    }

    /// Register an `R` response layout.
    pub fn response(self, id: u8, fields: &[FieldType]) -> Self {
        self.entry(MessageKey::response(id), fields)
    }

    /// Register an `S` spontaneous message layout.
    pub fn spontaneous(self, id: u8, fields: &[FieldType]) -> Self {
        self.entry(MessageKey::spontaneous(id), fields)
    }

    /// Validate and freeze the table.
    pub fn build(self) -> Result<SpecifierTable> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (key, fields) in self.entries {
            if !key.is_valid() {
                return Err(Error::InvalidParameter(format!(
                    "message id {} does not fit in two digits",
                    key.id
                )));
            }
            if entries.insert(key, fields).is_some() {
                return Err(Error::InvalidParameter(format!(
                    "duplicate specifier for {key}"
                )));
            }
        }
        Ok(SpecifierTable { entries })
    }
}

/// The specifier table for the stock UWB module firmware.
pub fn uwb_module() -> SpecifierTable {
    use FieldType::*;

    let hex = Bytes(BlobEncoding::Hex);

    let mut range_at_target = vec![Int, Float];
    range_at_target.extend([Int; 6]);
    range_at_target.extend([Float; 4]);

    let mut passive = vec![UInt, UInt];
    passive.extend([Int; 9]);
    passive.extend([Float; 10]);
    let entries = [
        (GET_ID, vec![]),
        (GET_ID.reply(), vec![Int]),
        (SET_PASSIVE_LISTENING, vec![Bool]),
        (SET_PASSIVE_LISTENING.reply(), vec![]),
        (BROADCAST, vec![hex]),
        (BROADCAST.reply(), vec![]),
        (DO_TWR, vec![UInt, Bool, Bool, Bool]),
        (DO_TWR.reply(), vec![Float]),
        (RANGE_AT_TARGET, range_at_target),
        (PASSIVE_LISTENING, passive),
        (PAYLOAD_RECEIVED, vec![hex, Bool]),
        (CHANNEL_IMPULSE_RESPONSE, vec![UInt, UInt, Int, Int, hex]),
    ];

    SpecifierTable {
        entries: entries.into_iter().collect(),
    }
}
