//! Time sources for timers and id generation.
//!
//! All times are milliseconds since the Unix epoch. [`TimeInfo`] wraps a
//! [`Clock`] and adds the server/client offset; tests and replays swap the
//! wall clock for a [`ManualClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day.
pub const ONE_DAY_MS: i64 = 86_400_000;
/// Milliseconds in one hour.
pub const HOUR_MS: i64 = 3_600_000;
/// Milliseconds in one minute.
pub const MINUTE_MS: i64 = 60_000;

/// A source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            // Clock set before 1970.
            Err(err) => -(err.duration().as_millis() as i64),
        }
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the same underlying time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::Release);
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Client and server time as seen by this process.
pub struct TimeInfo {
    clock: Arc<dyn Clock>,
    server_minus_client: AtomicI64,
}

impl TimeInfo {
    /// Creates a time source backed by `clock` with no server offset.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            server_minus_client: AtomicI64::new(0),
        }
    }

    /// Local time in milliseconds.
    pub fn client_now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Local time in whole seconds.
    pub fn client_now_seconds(&self) -> i64 {
        self.client_now().div_euclid(1000)
    }

    /// Estimated server time in milliseconds.
    pub fn server_now(&self) -> i64 {
        self.client_now() + self.server_minus_client.load(Ordering::Acquire)
    }

    /// Records the offset between server and client clocks.
    pub fn set_server_minus_client(&self, offset_ms: i64) {
        self.server_minus_client.store(offset_ms, Ordering::Release);
    }
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for TimeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeInfo")
            .field("client_now", &self.client_now())
            .field(
                "server_minus_client",
                &self.server_minus_client.load(Ordering::Relaxed),
            )
            .finish()
    }
}
