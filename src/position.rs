//! Per-account position record.
//!
//! A position holds one discounted balance per asset. Each balance is either
//! collateral or debt; the position kind is derived from which side carries
//! debt and is never stored separately.

use crate::heap::HeapNode;
use crate::types::{AccountId, Asset};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discounted balance on one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Holding {
    Collateral(u128),
    Debt(u128),
}

impl Holding {
    pub fn empty() -> Self {
        Holding::Collateral(0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount() == 0
    }

    pub fn amount(&self) -> u128 {
        match self {
            Holding::Collateral(a) | Holding::Debt(a) => *a,
        }
    }

    pub fn collateral(&self) -> u128 {
        match self {
            Holding::Collateral(a) => *a,
            Holding::Debt(_) => 0,
        }
    }

    pub fn debt(&self) -> u128 {
        match self {
            Holding::Debt(a) => *a,
            Holding::Collateral(_) => 0,
        }
    }

    pub fn is_debt(&self) -> bool {
        matches!(self, Holding::Debt(a) if *a > 0)
    }

    // Debt(0) and Collateral(0) mean the same thing; keep one spelling.
    pub(crate) fn normalized(self) -> Self {
        match self {
            Holding::Debt(0) => Holding::Collateral(0),
            other => other,
        }
    }
}

impl Default for Holding {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionKind {
    Uninitialized,
    Lend,
    Short,
    Long,
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionKind::Uninitialized => "uninitialized",
            PositionKind::Lend => "lend",
            PositionKind::Short => "short",
            PositionKind::Long => "long",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub base: Holding,
    pub quote: Holding,
    /// 1-based slot in the short or long heap, 0 when in neither.
    pub heap_index: u32,
}

impl Position {
    pub fn lend(discounted_base: u128, discounted_quote: u128) -> Self {
        Self {
            base: Holding::Collateral(discounted_base),
            quote: Holding::Collateral(discounted_quote),
            heap_index: 0,
        }
    }

    /// Short: base debt, quote collateral. Long: quote debt, base collateral.
    pub fn kind(&self) -> PositionKind {
        match (self.base.is_debt(), self.quote.is_debt()) {
            (true, false) => PositionKind::Short,
            (false, true) => PositionKind::Long,
            // both-debt is never committed; treat it as the side that would be liquidated first
            (true, true) => PositionKind::Short,
            (false, false) if self.base.is_zero() && self.quote.is_zero() => {
                PositionKind::Uninitialized
            }
            (false, false) => PositionKind::Lend,
        }
    }

    pub fn is_leveraged(&self) -> bool {
        matches!(self.kind(), PositionKind::Short | PositionKind::Long)
    }

    pub fn holding(&self, asset: Asset) -> Holding {
        match asset {
            Asset::Base => self.base,
            Asset::Quote => self.quote,
        }
    }

    pub(crate) fn holding_mut(&mut self, asset: Asset) -> &mut Holding {
        match asset {
            Asset::Base => &mut self.base,
            Asset::Quote => &mut self.quote,
        }
    }

    /// Heap ordering key: discounted debt / discounted collateral in Q48.
    /// Saturates when collateral is zero.
    pub fn sort_key(&self) -> u128 {
        let (debt, collateral) = match self.kind() {
            PositionKind::Short => (self.base.debt(), self.quote.collateral()),
            PositionKind::Long => (self.quote.debt(), self.base.collateral()),
            _ => return 0,
        };
        if collateral == 0 {
            return u128::MAX;
        }
        let key = (U256::from(debt) << 48) / U256::from(collateral);
        if key > U256::from(u128::MAX) {
            u128::MAX
        } else {
            key.low_u128()
        }
    }

    pub fn heap_node(&self, account: AccountId) -> HeapNode {
        HeapNode {
            key: self.sort_key(),
            account,
        }
    }
}
