// 9.0: external collaborators the pool consumes: a base price feed and a swap venue.
// only the boundary lives here; routing to real liquidity is somebody else's job.
// 9.1 SimulatedVenue is an in-memory stand-in (mocked) used by tests and pool-sim.

use crate::fp96::{Fp96, MathError};
use crate::types::{Asset, SwapParams};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("price feed unavailable")]
    Unavailable,

    #[error("price feed returned zero")]
    ZeroPrice,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("venue returned {actual}, minimum was {minimum}")]
    InsufficientOutput { minimum: u128, actual: u128 },

    #[error("venue wants {actual}, maximum was {maximum}")]
    ExcessiveInput { maximum: u128, actual: u128 },

    #[error("venue unavailable: {0}")]
    Unavailable(String),

    #[error("venue math: {0}")]
    Math(#[from] MathError),
}

pub trait PriceOracle {
    /// Quote per one unit of base, Q96.
    fn base_price(&self) -> Result<Fp96, OracleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub token_in: Asset,
    pub token_out: Asset,
    /// Input amount when `exact_input`, otherwise the output amount wanted.
    pub amount: u128,
    pub exact_input: bool,
    /// Minimum output when `exact_input`, otherwise maximum input.
    pub limit: u128,
    pub params: SwapParams,
}

impl SwapRequest {
    pub fn exact_input(token_in: Asset, amount_in: u128, min_out: u128, params: SwapParams) -> Self {
        Self {
            token_in,
            token_out: token_in.other(),
            amount: amount_in,
            exact_input: true,
            limit: min_out,
            params,
        }
    }

    pub fn exact_output(token_in: Asset, amount_out: u128, max_in: u128, params: SwapParams) -> Self {
        Self {
            token_in,
            token_out: token_in.other(),
            amount: amount_out,
            exact_input: false,
            limit: max_in,
            params,
        }
    }

    /// Whether `fill` honours the amount and the limit of this request.
    pub fn is_honoured_by(&self, fill: &SwapFill) -> bool {
        if self.exact_input {
            fill.amount_in == self.amount && fill.amount_out >= self.limit
        } else {
            fill.amount_out == self.amount && fill.amount_in <= self.limit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapFill {
    pub amount_in: u128,
    pub amount_out: u128,
}

pub trait SwapRouter {
    fn swap(&mut self, request: &SwapRequest) -> Result<SwapFill, SwapError>;
}

/// Fills every swap at the oracle price worsened by `execution_slippage`.
#[derive(Debug, Clone)]
pub struct SimulatedVenue {
    price: Fp96,
    execution_slippage: Decimal,
    halted: bool,
    pub swaps_executed: u64,
}

impl SimulatedVenue {
    pub fn new(price: Decimal) -> Result<Self, MathError> {
        Ok(Self {
            price: Fp96::from_decimal(price)?,
            execution_slippage: Decimal::ZERO,
            halted: false,
            swaps_executed: 0,
        })
    }

    pub fn set_price(&mut self, price: Decimal) -> Result<(), MathError> {
        self.price = Fp96::from_decimal(price)?;
        Ok(())
    }

    pub fn price(&self) -> Fp96 {
        self.price
    }

    pub fn set_execution_slippage(&mut self, slippage: Decimal) {
        self.execution_slippage = slippage;
    }

    /// A halted venue rejects every swap but keeps quoting prices.
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    fn quote_out(&self, token_in: Asset, amount_in: u128) -> Result<u128, MathError> {
        let at_oracle = match token_in {
            Asset::Base => self.price.mul_amount(amount_in)?,
            Asset::Quote => self.price.recip_mul(amount_in)?,
        };
        let out = to_decimal(at_oracle)? * (Decimal::ONE - self.execution_slippage);
        out.floor().to_u128().ok_or(MathError::Overflow)
    }

    fn quote_in(&self, token_in: Asset, amount_out: u128) -> Result<u128, MathError> {
        let at_oracle = match token_in {
            Asset::Base => self.price.recip_mul(amount_out)?,
            Asset::Quote => self.price.mul_amount(amount_out)?,
        };
        let keep = Decimal::ONE - self.execution_slippage;
        if keep <= Decimal::ZERO {
            return Err(MathError::DivisionByZero);
        }
        let needed = to_decimal(at_oracle)? / keep;
        needed.ceil().to_u128().ok_or(MathError::Overflow)
    }
}

fn to_decimal(amount: u128) -> Result<Decimal, MathError> {
    Decimal::from_u128(amount).ok_or(MathError::Overflow)
}

impl PriceOracle for SimulatedVenue {
    fn base_price(&self) -> Result<Fp96, OracleError> {
        if self.price.is_zero() {
            return Err(OracleError::ZeroPrice);
        }
        Ok(self.price)
    }
}

impl SwapRouter for SimulatedVenue {
    fn swap(&mut self, request: &SwapRequest) -> Result<SwapFill, SwapError> {
        if self.halted {
            return Err(SwapError::Unavailable("venue halted".to_string()));
        }

        let fill = if request.exact_input {
            let out = self.quote_out(request.token_in, request.amount)?;
            if out < request.limit {
                return Err(SwapError::InsufficientOutput {
                    minimum: request.limit,
                    actual: out,
                });
            }
            SwapFill {
                amount_in: request.amount,
                amount_out: out,
            }
        } else {
            let needed = self.quote_in(request.token_in, request.amount)?;
            if needed > request.limit {
                return Err(SwapError::ExcessiveInput {
                    maximum: request.limit,
                    actual: needed,
                });
            }
            SwapFill {
                amount_in: needed,
                amount_out: request.amount,
            }
        };

        self.swaps_executed += 1;
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fills_at_oracle_price() {
        let mut venue = SimulatedVenue::new(dec!(2)).unwrap();
        let fill = venue
            .swap(&SwapRequest::exact_input(Asset::Base, 100, 0, SwapParams::default()))
            .unwrap();
        assert_eq!(fill.amount_out, 200);

        let fill = venue
            .swap(&SwapRequest::exact_output(Asset::Quote, 100, u128::MAX, SwapParams::default()))
            .unwrap();
        assert_eq!(fill.amount_in, 200);
        assert_eq!(venue.swaps_executed, 2);
    }

    #[test]
    fn limits_are_enforced() {
        let mut venue = SimulatedVenue::new(dec!(1)).unwrap();
        venue.set_execution_slippage(dec!(0.1));
        let err = venue
            .swap(&SwapRequest::exact_input(Asset::Quote, 1_000, 950, SwapParams::default()))
            .unwrap_err();
        assert!(matches!(err, SwapError::InsufficientOutput { actual: 900, .. }));

        let err = venue
            .swap(&SwapRequest::exact_output(Asset::Quote, 900, 950, SwapParams::default()))
            .unwrap_err();
        assert!(matches!(err, SwapError::ExcessiveInput { actual: 1_000, .. }));
    }

    #[test]
    fn halted_venue_rejects() {
        let mut venue = SimulatedVenue::new(dec!(1)).unwrap();
        venue.set_halted(true);
        assert!(venue
            .swap(&SwapRequest::exact_input(Asset::Base, 1, 0, SwapParams::default()))
            .is_err());
        assert!(venue.base_price().is_ok());
    }

    #[test]
    fn request_honoured_check() {
        let req = SwapRequest::exact_input(Asset::Base, 10, 20, SwapParams::default());
        assert!(req.is_honoured_by(&SwapFill { amount_in: 10, amount_out: 20 }));
        assert!(!req.is_honoured_by(&SwapFill { amount_in: 10, amount_out: 19 }));
    }
}
