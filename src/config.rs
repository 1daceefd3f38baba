//! Compiler configuration.
//!
//! Uses `heapless::String` for names so a configuration can be embedded next
//! to the generated tables on small targets.
//!
//! # Example
//!
//! ```rust
//! use rs_interlock::config::{AllocatorConfig, BoardConfig, Config};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.allocator.block_size, 2048);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_board(BoardConfig::default().with_name("yard").unwrap())
//!     .with_allocator(AllocatorConfig::default().with_block_size(512));
//! assert_eq!(config.board.name.as_str(), "yard");
//! ```

use heapless::String as HString;

use crate::error::{BuildError, Result};

/// Maximum length for config names
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Event identifier block used by default layouts.
pub const DEFAULT_EVENT_BASE: u64 = 0x0501_0101_1422_0000;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Create a ShortString from a &str, rejecting names that do not fit
pub fn short_string(s: &str) -> Result<ShortString> {
    let mut hs = ShortString::new();
    hs.push_str(s).map_err(|_| BuildError::NameTooLong {
        name: s.to_string(),
        max: MAX_SHORT_STRING,
    })?;
    Ok(hs)
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete compiler configuration
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Board (root scope) identification
    pub board: BoardConfig,
    /// Variable address space
    pub allocator: AllocatorConfig,
    /// Detector filtering defaults
    pub detector: DetectorConfig,
    /// Reference simulator settings
    pub sim: SimConfig,
}

impl Config {
    /// Set board configuration
    pub fn with_board(mut self, board: BoardConfig) -> Self {
        self.board = board;
        self
    }

    /// Set allocator configuration
    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = allocator;
        self
    }

    /// Set detector configuration
    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    /// Set simulator configuration
    pub fn with_sim(mut self, sim: SimConfig) -> Self {
        self.sim = sim;
        self
    }

    /// Parse a configuration from JSON. Missing sections keep their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Board Config
// ============================================================================

/// Board identification
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoardConfig {
    /// Root scope name, prefixed to every variable name
    pub name: ShortString,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: short_string("logic").unwrap_or_default(),
        }
    }
}

impl BoardConfig {
    /// Set the board name. Every variable name starts with it, so a name
    /// that does not fit is an error rather than silently cut.
    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = short_string(name)?;
        Ok(self)
    }
}

// ============================================================================
// Allocator Config
// ============================================================================

/// Variable address space configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AllocatorConfig {
    /// First event identifier of the block
    pub event_base: u64,
    /// Number of variable addresses in the block
    pub block_size: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            event_base: DEFAULT_EVENT_BASE,
            block_size: 2048,
        }
    }
}

impl AllocatorConfig {
    /// Set the event base
    pub fn with_event_base(mut self, base: u64) -> Self {
        self.event_base = base;
        self
    }

    /// Set the block size
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }
}

// ============================================================================
// Detector Config
// ============================================================================

/// Detector filtering configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorConfig {
    /// Evaluations a raw input must stay stable before occupancy follows
    pub debounce_cycles: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { debounce_cycles: 3 }
    }
}

impl DetectorConfig {
    /// Set the debounce window
    pub fn with_debounce_cycles(mut self, cycles: u8) -> Self {
        self.debounce_cycles = cycles;
        self
    }
}

// ============================================================================
// Sim Config
// ============================================================================

/// Reference simulator configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Upper bound of full evaluation cycles in `settle`
    pub max_settle_cycles: u32,
    /// Evaluate automata in reverse declaration order
    pub reverse_order: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_settle_cycles: 64,
            reverse_order: false,
        }
    }
}

impl SimConfig {
    /// Set the settle bound
    pub fn with_max_settle_cycles(mut self, cycles: u32) -> Self {
        self.max_settle_cycles = cycles;
        self
    }

    /// Evaluate in reverse order
    pub fn with_reverse_order(mut self, reverse: bool) -> Self {
        self.reverse_order = reverse;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
