//! Pool runtime options that are not risk parameters.

use crate::types::AccountId;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Account allowed to change pool parameters.
    pub admin: AccountId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            admin: AccountId(1),
        }
    }
}

impl EngineConfig {
    pub fn with_admin(admin: AccountId) -> Self {
        Self {
            admin,
            ..Self::default()
        }
    }
}
