//! Session configuration for compressor and decompressor.

use crate::multiplex::DEFAULT_CAPACITY;
use crate::settings::Settings;

/// Which diagnostic traces go to the `log` facade at `trace` level.
///
/// Everything is off by default; the command line enables all flags with
/// `--debug`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceConfig {
    /// Every written or read choice.
    pub choices: bool,
    /// Forks, commits and dropped branches of the compressor.
    pub forks: bool,
    /// Block headers of the multiplexer.
    pub blocks: bool,
}

impl TraceConfig {
    /// All traces enabled.
    pub fn all() -> Self {
        Self { choices: true, forks: true, blocks: true }
    }
}

/// Compressor configuration.
#[derive(Debug, Clone)]
pub struct CompressConfig {
    /// Coder and channel filters, written to the settings stream.
    pub settings: Settings,
    /// Buffered bytes across all channels before the multiplexer emits blocks.
    pub block_capacity: usize,
    pub trace: TraceConfig,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self { settings: Settings::default(), block_capacity: DEFAULT_CAPACITY, trace: TraceConfig::default() }
    }
}

impl CompressConfig {
    /// Configuration with the given settings.
    pub fn with_settings(settings: Settings) -> Self {
        Self { settings, ..Self::default() }
    }
}

/// Decompressor configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressConfig {
    /// Decode even if the stored schema checksum differs.
    pub ignore_checksum: bool,
    pub trace: TraceConfig,
}
