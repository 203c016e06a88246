use log::LevelFilter;

use crate::pool::DEFAULT_POOL_CAPACITY;

/// Runtime configuration shared by every subsystem.
///
/// Built once at startup and handed to the game context; nothing reads it
/// through a global.
///
/// # Example
///
/// ```
/// use moye_core::Options;
///
/// let options = Options::default().with_develop(false).with_process(7);
/// assert!(!options.develop);
/// assert_eq!(options.process, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Development mode. Enables the coroutine lock watchdog.
    pub develop: bool,
    /// Whether this process is a server.
    pub is_server: bool,
    /// Process number packed into general ids (lower 14 bits are used).
    pub process: u16,
    /// Per-type free list cap of the object pool.
    pub pool_capacity: usize,
    /// How long a coroutine lock may be held before the watchdog logs.
    pub lock_watchdog_ms: i64,
    /// Maximum level of the `log` facade, applied when the game is built.
    pub log_level: LevelFilter,
}

impl Options {
    /// Sets development mode.
    pub fn with_develop(mut self, develop: bool) -> Self {
        self.develop = develop;
        self
    }

    /// Sets the server flag.
    pub fn with_server(mut self, is_server: bool) -> Self {
        self.is_server = is_server;
        self
    }

    /// Sets the process number.
    pub fn with_process(mut self, process: u16) -> Self {
        self.process = process;
        self
    }

    /// Sets the per-type pool cap.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Sets the lock watchdog duration.
    pub fn with_lock_watchdog_ms(mut self, timeout_ms: i64) -> Self {
        self.lock_watchdog_ms = timeout_ms;
        self
    }

    /// Sets the maximum log level.
    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// Watchdog duration if the watchdog is enabled.
    pub fn lock_watchdog(&self) -> Option<i64> {
        self.develop.then_some(self.lock_watchdog_ms)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            develop: true,
            is_server: false,
            process: 1,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            lock_watchdog_ms: 60 * 1000,
            log_level: LevelFilter::Info,
        }
    }
}
