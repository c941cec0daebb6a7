// 1.0: all the primitives live here. account ids, assets, timestamps, swap routing words.
// each is a newtype so the compiler catches type mixups.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    /// Reserved account that accumulates protocol fees as lend collateral.
    pub const FEE_HOLDER: AccountId = AccountId(0);

    pub fn is_fee_holder(&self) -> bool {
        *self == Self::FEE_HOLDER
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Base = the traded asset. Quote = the asset prices are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Base,
    Quote,
}

impl Asset {
    pub fn other(&self) -> Self {
        match self {
            Asset::Base => Asset::Quote,
            Asset::Quote => Asset::Base,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Base => write!(f, "base"),
            Asset::Quote => write!(f, "quote"),
        }
    }
}

// 1.1: opaque routing word handed to the swap venue untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwapParams(pub u32);

// 1.2: second-resolution timestamp. accrual compounds per elapsed second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds from `earlier` to `self`; zero when the clock did not move forward.
    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

pub const SECONDS_IN_DAY: u64 = 24 * 60 * 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_other() {
        assert_eq!(Asset::Base.other(), Asset::Quote);
        assert_eq!(Asset::Quote.other(), Asset::Base);
    }

    #[test]
    fn seconds_since_never_negative() {
        let t0 = Timestamp::from_secs(100);
        let t1 = t0.plus_secs(SECONDS_IN_DAY);
        assert_eq!(t1.seconds_since(t0), SECONDS_IN_DAY);
        assert_eq!(t0.seconds_since(t1), 0);
    }

    #[test]
    fn fee_holder_is_reserved() {
        assert!(AccountId::FEE_HOLDER.is_fee_holder());
        assert!(!AccountId(7).is_fee_holder());
    }
}
