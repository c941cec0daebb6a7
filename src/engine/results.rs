// 8.0.2: result types and errors for pool operations.

use crate::config::ConfigError;
use crate::fp96::{Fp96, MathError};
use crate::types::{AccountId, Asset};
use crate::venue::{OracleError, SwapError};
use serde::{Deserialize, Serialize};

/// What a successful `execute` reports back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    /// Real base moved by the call (deposited, withdrawn, traded or paid out).
    pub base_amount: u128,
    /// Real quote moved by the call.
    pub quote_amount: u128,
    /// Heap slot of the affected position afterwards, 0 if not leveraged.
    pub heap_index: u32,
    /// The caller's own position was force-liquidated; the requested operation did not run.
    pub margin_called: bool,
}

/// Pool-wide leverage per side, Q96, as the pool stores it: capped at
/// `max_leverage`, because it is the multiplier on the interest rate. A side
/// can be more leveraged than this; `PoolState::system_leverage_uncapped`
/// reports the actual ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLeverage {
    pub short: Fp96,
    pub long: Fp96,
}

impl Default for SystemLeverage {
    fn default() -> Self {
        Self {
            short: Fp96::one(),
            long: Fp96::one(),
        }
    }
}

impl SystemLeverage {
    /// Leverage of the side that borrows `debt_asset`: shorts borrow base, longs borrow quote.
    pub fn for_debt(&self, debt_asset: Asset) -> Fp96 {
        match debt_asset {
            Asset::Base => self.short,
            Asset::Quote => self.long,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("Amount must be non-zero")]
    ZeroAmount,

    #[error("Amount exceeds limit")]
    ExceedsLimit,

    #[error("Position {0} is not initialized")]
    UninitializedPosition(AccountId),

    #[error("Position {0} already exists")]
    PositionInitialized(AccountId),

    #[error("Position {0} is not liquidatable")]
    NotLiquidatable(AccountId),

    #[error("Leverage above pool maximum")]
    BadLeverage,

    #[error("Operation not allowed for this position type")]
    WrongPositionType,

    #[error("Swap price worse than limit")]
    SlippageLimit,

    #[error("Amount below position minimum {minimum}")]
    LessThanMinimalAmount { minimum: u128 },

    #[error("Wrong value: {0}")]
    WrongValue(&'static str),

    #[error("Forbidden")]
    Forbidden,

    #[error("Account {0} is not the admin")]
    AccessDenied(AccountId),

    #[error("Pool is not in emergency mode")]
    NotEmergency,

    #[error("Pool is in emergency mode")]
    EmergencyMode,

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
