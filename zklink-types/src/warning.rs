//! Non-fatal decode findings

use tracing::warn;

/// Something odd in device data that did not stop decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeWarning {
    /// User table width is neither 28 nor 72; decoded as 72
    #[error("unexpected user record width {width}")]
    UnexpectedRecordWidth { width: usize },

    /// Bytes left over after the last full record
    #[error("{remaining} trailing bytes shorter than a {width}-byte record")]
    TrailingBytes { remaining: usize, width: usize },

    /// Capacity reply shorter than the 80-byte counter block
    #[error("capacity block has {available} of 80 bytes")]
    ShortCapacityBlock { available: usize },

    /// Device reported users but sent no table
    #[error("missing user data ({size} bytes)")]
    MissingUserData { size: usize },
}

/// A decoded value plus whatever was off about its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub warnings: Vec<DecodeWarning>,
}

impl<T> Decoded<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Record and log a warning
    pub fn warn(&mut self, warning: DecodeWarning) {
        record(&mut self.warnings, warning);
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

pub(crate) fn record(warnings: &mut Vec<DecodeWarning>, warning: DecodeWarning) {
    warn!("{}", warning);
    warnings.push(warning);
}
