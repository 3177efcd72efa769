//! Environment configuration loading from .env files
//!
//! Loads configuration values from .env or environment variables.
//! Used for interpreter tracing and the JIT register-caching policy.

use std::env;

use once_cell::sync::Lazy;

/// Number of memory cells cached in host registers by default
pub const DEFAULT_CACHED_CELLS: usize = 3;

// Automatically load .env when config module is accessed
static DOTENV_INIT: Lazy<()> = Lazy::new(|| {
    let _ = dotenv::dotenv();
});

/// Ensure environment is loaded
#[inline]
fn ensure_loaded() {
    let _ = &*DOTENV_INIT;
}

/// Load cached cell count from environment
/// Default: 3 (cells 0, 1 and 2)
pub fn cached_cells() -> usize {
    ensure_loaded();
    env::var("TOYVM_CACHED_CELLS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CACHED_CELLS)
}

/// Load interpreter tracing flag from environment
/// Default: false
pub fn trace_execution() -> bool {
    ensure_loaded();
    env::var("TOYVM_TRACE")
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Cached values
pub static CACHED_CELLS: Lazy<usize> = Lazy::new(cached_cells);
pub static TRACE_EXECUTION: Lazy<bool> = Lazy::new(trace_execution);

/// VM configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Emit a trace event per interpreted instruction
    pub trace_execution: bool,
    /// Memory cells bound to host registers in compiled code
    pub cached_cells: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            trace_execution: false,
            cached_cells: DEFAULT_CACHED_CELLS,
        }
    }
}

impl VmConfig {
    /// Configuration from the environment (and `.env`)
    pub fn from_env() -> Self {
        Self {
            trace_execution: *TRACE_EXECUTION,
            cached_cells: *CACHED_CELLS,
        }
    }

    /// Sets the cached cell count
    pub fn with_cached_cells(mut self, cells: usize) -> Self {
        self.cached_cells = cells;
        self
    }

    /// Enables or disables per-instruction tracing
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace_execution = trace;
        self
    }
}
