// 8.5 engine/accrual.rs: interest and fee accrual, run at the top of every call.
// 8.5.1 debt grows by interest x fee; collateral grows by interest only; the
// fee share goes to the fee holder as collateral.
// 8.5.2 after accrual the worst positions are liquidated until each heap root
// is within bounds and system leverage is back under the maximum.

use super::core::{CallContext, MarginPool};
use super::results::PoolError;
use crate::events::{EventPayload, ReinitEvent};
use crate::fp96::{Fp96, SECONDS_IN_YEAR};
use crate::types::{AccountId, Asset, Timestamp};
use crate::venue::{PriceOracle, SwapRouter};
use tracing::debug;

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    /// Brings coefficients up to `now`. No-op (returns false) when no time
    /// has passed or the pool is in emergency mode.
    pub(super) fn accrue(&mut self, now: Timestamp, price: Fp96) -> Result<bool, PoolError> {
        if self.state.mode.is_emergency() {
            return Ok(false);
        }
        let secs = now.seconds_since(self.state.last_accrual);
        if secs == 0 {
            return Ok(false);
        }
        self.accrue_for(secs, price)?;
        self.state.last_accrual = now;
        Ok(true)
    }

    fn accrue_for(&mut self, secs: u64, price: Fp96) -> Result<(), PoolError> {
        if secs == 0 {
            return Err(PoolError::WrongValue("accrual needs elapsed time"));
        }
        let year = Fp96::from_int(SECONDS_IN_YEAR as u128);
        let one = Fp96::one();
        let fee_dt = one
            .add(self.state.params.fee_x96()?.div(year)?)?
            .pow_taylor(secs)?;
        let interest_rate = self.state.params.interest_rate_x96()?;

        for debt_asset in [Asset::Base, Asset::Quote] {
            let ledger = self.state.ledger(debt_asset);
            if ledger.discounted_debt == 0 {
                continue;
            }

            // lenders take more risk when the side is more leveraged
            let leverage = self.state.system_leverage.for_debt(debt_asset);
            let per_second = interest_rate.mul(leverage)?.div(year)?;
            let ar_dt = one.add(per_second)?.pow_taylor(secs)?;

            let real_debt_prev = ledger.total_real_debt()?;
            let interest = ar_dt.sub(one)?.mul_amount(real_debt_prev)?;
            let real_fee = ar_dt.mul(fee_dt.sub(one)?)?.mul_amount(real_debt_prev)?;

            let ledger = self.state.ledger_mut(debt_asset);
            if ledger.discounted_collateral > 0 {
                let per_unit = Fp96::from_ratio(interest, ledger.discounted_collateral)?;
                ledger.collateral_coeff = ledger.collateral_coeff.add(per_unit)?;
            }
            ledger.debt_coeff = ledger.debt_coeff.mul(ar_dt)?.mul(fee_dt)?;
            ledger.debt_relief = ledger.debt_relief.mul(ar_dt)?.mul(fee_dt)?;

            self.state.credit(AccountId::FEE_HOLDER, debt_asset, real_fee)?;

            debug!(
                asset = ?debt_asset,
                secs,
                %leverage,
                interest,
                fee = real_fee,
                "interest accrued"
            );
        }

        self.state.refresh_system_leverage(price)
    }

    /// Accrual plus the liquidation pass. Returns true when the caller's own
    /// position was liquidated.
    pub(super) fn reinit(&mut self, ctx: &CallContext) -> Result<bool, PoolError> {
        let elapsed = ctx.now.seconds_since(self.state.last_accrual);
        if !self.accrue(ctx.now, ctx.price)? {
            return Ok(false);
        }
        self.record(EventPayload::Reinit(ReinitEvent {
            elapsed_seconds: elapsed,
            short_leverage: self.state.system_leverage.short,
            long_leverage: self.state.system_leverage.long,
        }));

        let liquidated = self.liquidation_pass(ctx)?;
        if liquidated.contains(&ctx.caller) {
            return Ok(true);
        }
        if self.state.mode.is_emergency() {
            return Ok(false);
        }

        // the caller's own position is checked even when it is not a heap root
        let own_bad = match self.state.position(ctx.caller) {
            Some(position) if position.heap_index != 0 => {
                self.state.is_liquidatable(position, ctx.price)?
            }
            _ => false,
        };
        if own_bad {
            self.margin_call(ctx, ctx.caller)?;
            self.state.refresh_system_leverage(ctx.price)?;
        }
        Ok(own_bad)
    }

    /// Pops each heap's root while it is over the leverage bound or its side
    /// as a whole is. A loss on one side moves the other side's leverage, so
    /// both heaps are swept again until a sweep liquidates nobody. Stops early
    /// if a liquidation trips emergency mode.
    fn liquidation_pass(&mut self, ctx: &CallContext) -> Result<Vec<AccountId>, PoolError> {
        let max = self.state.params.max_leverage_x96();
        let mut liquidated = Vec::new();

        loop {
            let swept = liquidated.len();
            for debt_asset in [Asset::Base, Asset::Quote] {
                loop {
                    if self.state.mode.is_emergency() {
                        return Ok(liquidated);
                    }
                    let Some(root) = self.state.heap_for_debt(debt_asset).peek().copied() else {
                        break;
                    };
                    let root_bad = match self.state.position(root.account) {
                        Some(position) => self.state.is_liquidatable(position, ctx.price)?,
                        None => false,
                    };
                    let system = self.state.system_leverage_uncapped(debt_asset, ctx.price)?;
                    if !root_bad && system <= max {
                        break;
                    }
                    self.margin_call(ctx, root.account)?;
                    liquidated.push(root.account);
                }
            }
            if liquidated.len() == swept {
                break;
            }
        }

        self.state.refresh_system_leverage(ctx.price)?;
        Ok(liquidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Call;
    use crate::config::PoolParams;
    use crate::engine::EngineConfig;
    use crate::position::Holding;
    use crate::venue::SimulatedVenue;
    use rust_decimal_macros::dec;

    const LENDER: AccountId = AccountId(10);
    const WORST: AccountId = AccountId(20);
    const CALLER: AccountId = AccountId(21);

    fn short(pool: &mut MarginPool<SimulatedVenue>, who: AccountId, margin: u128, size: u128) {
        pool.execute_call(
            who,
            Call::DepositQuote {
                amount: margin,
                short_amount: size,
                limit_price: Fp96::zero(),
                owner: None,
            },
        )
        .unwrap();
    }

    /// Two shorts; the caller's collateral is cut behind the heap's back so it
    /// is over the bound while the root, ranked on its old key, is not.
    fn stale_heap_pool() -> MarginPool<SimulatedVenue> {
        let venue = SimulatedVenue::new(dec!(1)).unwrap();
        let mut pool = MarginPool::new(
            EngineConfig::default(),
            PoolParams::testnet(),
            venue,
            Timestamp::from_secs(1_000),
        )
        .unwrap();
        for asset in [Asset::Base, Asset::Quote] {
            let call = match asset {
                Asset::Base => Call::DepositBase {
                    amount: 20_000,
                    long_amount: 0,
                    limit_price: Fp96::zero(),
                    owner: None,
                },
                Asset::Quote => Call::DepositQuote {
                    amount: 20_000,
                    short_amount: 0,
                    limit_price: Fp96::zero(),
                    owner: None,
                },
            };
            pool.execute_call(LENDER, call).unwrap();
        }
        short(&mut pool, WORST, 500, 7_500);
        short(&mut pool, CALLER, 1_000, 7_000);
        assert_eq!(pool.state.heap_index_of(WORST), 1);

        // 8_000 -> 7_200 quote: 7_200 / 200 = 36x at price 1
        if let Some(position) = pool.state.positions.get_mut(&CALLER) {
            position.quote = Holding::Collateral(7_200);
        }
        pool.state.quote.discounted_collateral -= 800;
        pool
    }

    #[test]
    fn caller_below_the_root_is_margin_called() {
        let mut pool = stale_heap_pool();
        pool.advance_time(1);

        let outcome = pool.execute_call(CALLER, Call::Reinit).unwrap();

        assert!(outcome.margin_called);
        assert!(pool.position(CALLER).is_none());
        assert_eq!(pool.state.heap_index_of(WORST), 1);
        assert_eq!(pool.state.short_heap.len(), 1);
    }

    #[test]
    fn lend_caller_is_not_checked() {
        let mut pool = stale_heap_pool();
        pool.advance_time(1);

        let outcome = pool.execute_call(LENDER, Call::Reinit).unwrap();

        assert!(!outcome.margin_called);
        assert_eq!(pool.state.short_heap.len(), 2);
        assert!(pool.position(CALLER).is_some());
    }

    #[test]
    fn no_elapsed_time_skips_the_pass() {
        let mut pool = stale_heap_pool();

        let outcome = pool.execute_call(CALLER, Call::Reinit).unwrap();

        assert!(!outcome.margin_called);
        assert!(pool.position(CALLER).is_some());
        assert_eq!(pool.state.last_accrual(), Timestamp::from_secs(1_000));
    }

    #[test]
    fn relief_compounds_with_the_debt_index() {
        let mut pool = stale_heap_pool();
        pool.state.base.debt_relief = Fp96::from_ratio(1, 2).unwrap();
        let before = pool.state.base.debt_coeff.sub(pool.state.base.debt_relief).unwrap();

        pool.advance_time(30 * crate::types::SECONDS_IN_DAY);
        pool.execute_call(LENDER, Call::Reinit).unwrap();

        let base = &pool.state.base;
        assert!(base.debt_relief > Fp96::from_ratio(1, 2).unwrap());
        let growth = base.debt_coeff.div(Fp96::one()).unwrap();
        let relief_growth = base.debt_relief.div(Fp96::from_ratio(1, 2).unwrap()).unwrap();
        let (a, b) = (growth.inner(), relief_growth.inner());
        let diff = if a > b { a - b } else { b - a };
        assert!(diff < primitive_types::U256::from(1u64 << 32), "index and relief drifted apart");
        assert!(base.debt_coeff.sub(base.debt_relief).unwrap() > before);
    }
}
