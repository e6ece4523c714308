//! Pool configuration parameters.

/// Configuration for a [`Pool`](crate::Pool).
///
/// Plain data; read once when the pool is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of entries the tracking table is pre-sized for.
    ///
    /// Default: 16. The table grows past this as needed.
    pub initial_capacity: usize,

    /// Upper bound on `bytes_allocated()`.
    ///
    /// Default: `None` (unbounded). When set, an allocate or resize that
    /// would take the pool above this fails with `LimitExceeded` before the
    /// allocator is called.
    pub byte_limit: Option<usize>,
}

impl PoolConfig {
    /// Default tracking table capacity.
    pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
            byte_limit: None,
        }
    }

    /// Set the tracking table capacity.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Cap the pool at `limit` outstanding bytes.
    pub fn with_byte_limit(mut self, limit: usize) -> Self {
        self.byte_limit = Some(limit);
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
