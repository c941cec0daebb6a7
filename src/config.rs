// 7.0 config.rs: pool parameters in one place. leverage bound, rates, fees, limits.
// 7.1 rates and fees are fractions (0.054 = 5.4%), converted to Q96 where the math needs them.

use crate::fp96::{mul_fraction, Fp96, MathError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Pool-wide risk and fee parameters. Settable by the admin account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParams {
    // Positions (and each side in aggregate) above this leverage get liquidated
    pub max_leverage: u32,
    // Annual interest charged to debt at leverage 1, scaled by system leverage
    pub interest_rate: Decimal,
    // Annual protocol fee charged on debt, credited to the fee holder
    pub fee: Decimal,
    // Charged on the quote leg of every leveraged swap
    pub swap_fee: Decimal,
    // Worst acceptable venue price versus oracle when liquidating
    pub mc_slippage: Decimal,
    // Smallest position size / first deposit, in real units
    pub position_min_amount: u128,
    // Cap on each asset's pool balance, valued in quote
    pub quote_limit: u128,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            max_leverage: 20,
            interest_rate: dec!(0.054), // 5.4%
            fee: dec!(0.01),            // 1%
            swap_fee: dec!(0.001),      // 0.1%
            mc_slippage: dec!(0.05),    // 5%
            position_min_amount: 5,
            quote_limit: 1_000_000_000_000,
        }
    }
}

impl PoolParams {
    // Preset with lower leverage and wider liquidation slippage
    pub fn conservative() -> Self {
        Self {
            max_leverage: 5,
            mc_slippage: dec!(0.1),
            ..Self::default()
        }
    }

    // Preset for test deployments: no protocol fee, small minimum
    pub fn testnet() -> Self {
        Self {
            fee: Decimal::ZERO,
            swap_fee: Decimal::ZERO,
            position_min_amount: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_leverage <= 1 {
            return Err(ConfigError::InvalidLeverage {
                value: self.max_leverage,
            });
        }

        for (name, value) in [
            ("interest_rate", self.interest_rate),
            ("fee", self.fee),
            ("swap_fee", self.swap_fee),
            ("mc_slippage", self.mc_slippage),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }

        if self.position_min_amount == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "position_min_amount",
            });
        }
        if self.quote_limit == 0 {
            return Err(ConfigError::ZeroLimit { name: "quote_limit" });
        }
        Ok(())
    }

    pub fn max_leverage_x96(&self) -> Fp96 {
        Fp96::from_int(self.max_leverage as u128)
    }

    pub fn interest_rate_x96(&self) -> Result<Fp96, MathError> {
        Fp96::from_decimal(self.interest_rate)
    }

    pub fn fee_x96(&self) -> Result<Fp96, MathError> {
        Fp96::from_decimal(self.fee)
    }

    /// Swap fee on a traded quote amount, rounded down.
    pub fn swap_fee_on(&self, quote_amount: u128) -> Result<u128, MathError> {
        mul_fraction(quote_amount, self.swap_fee)
    }

    /// Least a liquidation swap may return for collateral worth `oracle_value`.
    pub fn mc_floor(&self, oracle_value: u128) -> Result<u128, MathError> {
        mul_fraction(oracle_value, Decimal::ONE - self.mc_slippage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max leverage must be above 1, got {value}")]
    InvalidLeverage { value: u32 },

    #[error("{name} must be within [0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: Decimal },

    #[error("{name} must be non-zero")]
    ZeroLimit { name: &'static str },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn params(&self) -> PoolParams {
        match self {
            Environment::Development => PoolParams::default(),
            Environment::Testnet => PoolParams::testnet(),
            Environment::Mainnet => PoolParams::conservative(),
        }
    }
}
