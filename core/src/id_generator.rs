//! Time-ordered, bit-packed 64-bit identifiers.
//!
//! Two independent schemes share the same generation algorithm and differ
//! only in their layout (MSB to LSB):
//!
//! | scheme | value | process | time |
//! |---|---|---|---|
//! | [`IdStruct`] (general ids) | 20 bits | 14 bits | 30 bits |
//! | [`InstanceIdStruct`] | 32 bits | — | 32 bits |
//!
//! `time` is whole seconds since [`EPOCH_MS`]. `value` is a per-second
//! sequence counter that resets on every new second.
//!
//! # Counter overflow
//!
//! When a second's counter runs out, the generator borrows the next second
//! and logs an error. Within one generator the ids stay strictly
//! increasing, because a borrowed second is only left once the wall clock
//! moves past it. A generator created later (for example after a restart)
//! starts from the real clock and may reissue ids in seconds that an
//! earlier generator borrowed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::time::TimeInfo;

/// Id epoch: 2023-05-01T00:00:00Z in milliseconds.
pub const EPOCH_MS: i64 = 1_682_899_200_000;

const fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Decoded general id: `value(20) | process(14) | time(30)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdStruct {
    /// Seconds since [`EPOCH_MS`].
    pub time: u32,
    /// Process number.
    pub process: u16,
    /// Sequence number within `time`.
    pub value: u32,
}

impl IdStruct {
    /// Bits used by `time`. Roughly 34 years of seconds.
    pub const TIME_BITS: u32 = 30;
    /// Bits used by `process`. 16384 processes.
    pub const PROCESS_BITS: u32 = 14;
    /// Bits used by `value`. About one million ids per second.
    pub const VALUE_BITS: u32 = 20;

    /// Largest `value` before the counter borrows the next second.
    pub const MAX_VALUE: u64 = mask(Self::VALUE_BITS);

    /// Packs the three fields into an id. Out-of-range bits are masked off.
    pub const fn convert_to_id(time: u32, process: u16, value: u32) -> u64 {
        let mut result = value as u64 & mask(Self::VALUE_BITS);
        result <<= Self::PROCESS_BITS;
        result |= process as u64 & mask(Self::PROCESS_BITS);
        result <<= Self::TIME_BITS;
        result |= time as u64 & mask(Self::TIME_BITS);
        result
    }

    /// Unpacks an id into its three fields.
    pub const fn parse_id(id: u64) -> Self {
        let time = id & mask(Self::TIME_BITS);
        let id = id >> Self::TIME_BITS;
        let process = id & mask(Self::PROCESS_BITS);
        let id = id >> Self::PROCESS_BITS;
        let value = id & mask(Self::VALUE_BITS);
        Self {
            time: time as u32,
            process: process as u16,
            value: value as u32,
        }
    }

    /// Packs these fields into an id.
    pub const fn to_id(&self) -> u64 {
        Self::convert_to_id(self.time, self.process, self.value)
    }
}

/// Decoded instance id: `value(32) | time(32)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceIdStruct {
    /// Seconds since [`EPOCH_MS`].
    pub time: u32,
    /// Sequence number within `time`.
    pub value: u32,
}

impl InstanceIdStruct {
    /// Bits used by `time`.
    pub const TIME_BITS: u32 = 32;
    /// Bits used by `value`.
    pub const VALUE_BITS: u32 = 32;

    /// Largest `value` before the counter borrows the next second.
    pub const MAX_VALUE: u64 = mask(Self::VALUE_BITS);

    /// Packs both fields into an id.
    pub const fn convert_to_id(time: u32, value: u32) -> u64 {
        ((value as u64) << Self::TIME_BITS) | time as u64
    }

    /// Unpacks an id into its two fields.
    pub const fn parse_id(id: u64) -> Self {
        Self {
            time: (id & mask(Self::TIME_BITS)) as u32,
            value: (id >> Self::TIME_BITS) as u32,
        }
    }

    /// Packs these fields into an id.
    pub const fn to_id(&self) -> u64 {
        Self::convert_to_id(self.time, self.value)
    }
}

/// Per-second sequence state of one id scheme.
#[derive(Debug, Default)]
struct SecondCounter {
    /// Last second handed out; 0 means "not started".
    last_time: i64,
    count: u64,
}

impl SecondCounter {
    /// Advances the counter for the current second and returns `(time, value)`.
    fn next(&mut self, now: i64, max_value: u64, scheme: &str) -> (i64, u64) {
        if self.last_time == 0 {
            self.last_time = now;
            if self.last_time <= 0 {
                log::warn!("{scheme}: clock is before the id epoch: {}", self.last_time);
                self.last_time = 1;
            }
        }

        if now > self.last_time {
            self.last_time = now;
            self.count = 0;
        } else {
            self.count += 1;
            if self.count > max_value {
                // Borrow the next second.
                self.last_time += 1;
                self.count = 0;
                log::error!(
                    "{scheme}: id count per second overflow: {now} {}",
                    self.last_time
                );
            }
        }

        (self.last_time, self.count)
    }
}

/// Generates general ids and instance ids from a shared time source.
///
/// Thread-safe: each scheme's counter sits behind its own lock, so one
/// generator can serve several game contexts in the same process.
pub struct IdGenerator {
    time: Arc<TimeInfo>,
    process: u16,
    ids: Mutex<SecondCounter>,
    instance_ids: Mutex<SecondCounter>,
}

impl IdGenerator {
    /// Creates a generator stamping `process` into general ids.
    pub fn new(time: Arc<TimeInfo>, process: u16) -> Self {
        Self {
            time,
            process,
            ids: Mutex::new(SecondCounter::default()),
            instance_ids: Mutex::new(SecondCounter::default()),
        }
    }

    /// Process number stamped into general ids.
    pub fn process(&self) -> u16 {
        self.process
    }

    /// Generates a general (domain-scoped) id.
    pub fn generate_id(&self) -> u64 {
        let now = self.time_since_epoch();
        let (time, value) = self.ids.lock().next(now, IdStruct::MAX_VALUE, "IdStruct");
        IdStruct::convert_to_id(time as u32, self.process, value as u32)
    }

    /// Generates a process-unique instance id.
    pub fn generate_instance_id(&self) -> u64 {
        let now = self.time_since_epoch();
        let (time, value) =
            self.instance_ids
                .lock()
                .next(now, InstanceIdStruct::MAX_VALUE, "InstanceIdStruct");
        InstanceIdStruct::convert_to_id(time as u32, value as u32)
    }

    fn time_since_epoch(&self) -> i64 {
        (self.time.client_now() - EPOCH_MS).div_euclid(1000)
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}
