//! Statement configuration.

use crate::protocol::capabilities;
use crate::temporal::TemporalConvention;

/// Configuration for a prepared statement channel.
///
/// # Example
///
/// ```
/// use mysql_stmt::{StatementConfig, TemporalConvention};
///
/// let config = StatementConfig::new()
///     .deprecate_eof(false)
///     .temporal_convention(TemporalConvention::FixedOffset { seconds: 3600 });
/// ```
#[derive(Debug, Clone)]
pub struct StatementConfig {
    /// Capability flags negotiated for the connection carrying this
    /// statement; they decide the result-set terminator flavor
    pub capabilities: u32,
    /// Offset convention for temporal values, applied symmetrically to
    /// binding and marshalling
    pub temporal: TemporalConvention,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            capabilities: capabilities::DEFAULT_STMT_FLAGS,
            temporal: TemporalConvention::default(),
        }
    }
}

impl StatementConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the capability flags wholesale.
    #[must_use]
    pub fn capabilities(mut self, capabilities: u32) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Toggle CLIENT_DEPRECATE_EOF. When on (the default), result sets
    /// terminate with an OK packet instead of EOF packets.
    #[must_use]
    pub fn deprecate_eof(mut self, enabled: bool) -> Self {
        if enabled {
            self.capabilities |= capabilities::CLIENT_DEPRECATE_EOF;
        } else {
            self.capabilities &= !capabilities::CLIENT_DEPRECATE_EOF;
        }
        self
    }

    /// Set the temporal offset convention. One convention covers both
    /// directions, so bound and fetched instants agree.
    #[must_use]
    pub fn temporal_convention(mut self, convention: TemporalConvention) -> Self {
        self.temporal = convention;
        self
    }
}
