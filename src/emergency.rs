// 6.0 emergency.rs: pool-wide circuit breaker state.
// 6.1 once tripped, balances and net value are frozen in a snapshot and every
// position can only leave through a pro-rata emergency withdrawal.

use crate::fp96::{mul_div, to_u128, Fp96, MathError};
use crate::types::Asset;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolMode {
    #[default]
    Regular,
    /// Shorts as a whole owe more base than the pool can recover.
    ShortEmergency,
    /// Longs as a whole owe more quote than the pool can recover.
    LongEmergency,
}

impl PoolMode {
    pub fn is_emergency(&self) -> bool {
        !matches!(self, PoolMode::Regular)
    }

    /// Emergency mode caused by unrecoverable debt in `asset`.
    pub fn for_debt(asset: Asset) -> Self {
        match asset {
            Asset::Base => PoolMode::ShortEmergency,
            Asset::Quote => PoolMode::LongEmergency,
        }
    }
}

impl fmt::Display for PoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolMode::Regular => "regular",
            PoolMode::ShortEmergency => "short emergency",
            PoolMode::LongEmergency => "long emergency",
        };
        write!(f, "{s}")
    }
}

/// Pool balances and total position net value at the moment emergency tripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencySnapshot {
    pub mode: PoolMode,
    /// Price every withdrawal is valued at.
    pub price: Fp96,
    pub base_balance: u128,
    pub quote_balance: u128,
    /// Sum of all positions' net value in quote, each floored at zero.
    pub total_net_value: u128,
}

impl EmergencySnapshot {
    /// `(base, quote)` paid out for a position worth `net_value`, rounded down.
    pub fn share_of(&self, net_value: u128) -> Result<(u128, u128), MathError> {
        if self.total_net_value == 0 || net_value == 0 {
            return Ok((0, 0));
        }
        let value = U256::from(net_value.min(self.total_net_value));
        let total = U256::from(self.total_net_value);
        let base = to_u128(mul_div(U256::from(self.base_balance), value, total)?)?;
        let quote = to_u128(mul_div(U256::from(self.quote_balance), value, total)?)?;
        Ok((base, quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EmergencySnapshot {
        EmergencySnapshot {
            mode: PoolMode::ShortEmergency,
            price: Fp96::one(),
            base_balance: 1_000,
            quote_balance: 3_000,
            total_net_value: 4_000,
        }
    }

    #[test]
    fn share_is_pro_rata() {
        let snap = snapshot();
        assert_eq!(snap.share_of(1_000).unwrap(), (250, 750));
        assert_eq!(snap.share_of(4_000).unwrap(), (1_000, 3_000));
        assert_eq!(snap.share_of(0).unwrap(), (0, 0));
    }

    #[test]
    fn share_never_exceeds_balances() {
        let snap = snapshot();
        assert_eq!(snap.share_of(10_000).unwrap(), (1_000, 3_000));

        let empty = EmergencySnapshot {
            total_net_value: 0,
            ..snapshot()
        };
        assert_eq!(empty.share_of(500).unwrap(), (0, 0));
    }

    #[test]
    fn mode_for_debt_side() {
        assert_eq!(PoolMode::for_debt(Asset::Base), PoolMode::ShortEmergency);
        assert_eq!(PoolMode::for_debt(Asset::Quote), PoolMode::LongEmergency);
        assert!(!PoolMode::default().is_emergency());
    }
}
