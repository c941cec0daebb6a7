// 8.9 engine/emergency.rs: tripping the circuit breaker and the pro-rata exit.

use super::core::{CallContext, MarginPool};
use super::results::{ExecuteOutcome, PoolError};
use crate::emergency::{EmergencySnapshot, PoolMode};
use crate::events::{EmergencyTrippedEvent, EmergencyWithdrawEvent, EventPayload};
use crate::types::{AccountId, Asset};
use crate::venue::{PriceOracle, SwapRouter};
use tracing::{info, warn};

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    /// Freezes the pool because debt in `debt_asset` can no longer be recovered.
    pub(super) fn trip_emergency(&mut self, ctx: &CallContext, debt_asset: Asset) -> Result<(), PoolError> {
        let mode = PoolMode::for_debt(debt_asset);
        let mut total_net_value: u128 = 0;
        for position in self.state.positions.values() {
            let value = self.state.net_value(position, ctx.price)?;
            total_net_value = total_net_value.saturating_add(value);
        }

        let snapshot = EmergencySnapshot {
            mode,
            price: ctx.price,
            base_balance: self.state.base.balance,
            quote_balance: self.state.quote.balance,
            total_net_value,
        };
        warn!(
            %mode,
            base_balance = snapshot.base_balance,
            quote_balance = snapshot.quote_balance,
            total_net_value,
            "emergency mode tripped"
        );
        self.record(EventPayload::EmergencyTripped(EmergencyTrippedEvent {
            mode,
            base_balance: snapshot.base_balance,
            quote_balance: snapshot.quote_balance,
        }));
        self.state.mode = mode;
        self.state.emergency = Some(snapshot);
        Ok(())
    }

    /// Trips emergency mode when a side's collateral is worth less than its debt.
    /// Anyone may call it.
    pub fn shut_down(&mut self, caller: AccountId) -> Result<PoolMode, PoolError> {
        self.atomically(|pool| {
            if pool.state.mode.is_emergency() {
                return Err(PoolError::EmergencyMode);
            }
            let ctx = CallContext {
                caller,
                price: pool.venue.base_price()?,
                route: Default::default(),
                now: pool.current_time,
            };
            pool.reinit(&ctx)?;
            if pool.state.mode.is_emergency() {
                return Ok(pool.state.mode);
            }

            let price = ctx.price;
            let state = &pool.state;
            let short_insolvent = state.total_collateral(Asset::Quote)?
                < price.mul_amount(state.base.total_real_debt()?)?;
            let long_insolvent = price.mul_amount(state.total_collateral(Asset::Base)?)?
                < state.quote.total_real_debt()?;

            let debt_asset = if short_insolvent {
                Asset::Base
            } else if long_insolvent {
                Asset::Quote
            } else {
                return Err(PoolError::NotEmergency);
            };
            info!(by = %caller, "shut down requested");
            pool.trip_emergency(&ctx, debt_asset)?;
            Ok(pool.state.mode)
        })
    }

    /// Pays out the position's share of the frozen balances and deletes it.
    pub(super) fn emergency_withdraw(
        &mut self,
        account: AccountId,
        unwrap: bool,
    ) -> Result<ExecuteOutcome, PoolError> {
        let snapshot = self.state.emergency.clone().ok_or(PoolError::NotEmergency)?;
        let position = self
            .state
            .position(account)
            .cloned()
            .ok_or(PoolError::UninitializedPosition(account))?;

        let net_value = self.state.net_value(&position, snapshot.price)?;
        let (base_amount, quote_amount) = snapshot.share_of(net_value)?;

        self.state.remove_position(account)?;
        self.state.take_balance(Asset::Base, base_amount)?;
        self.state.take_balance(Asset::Quote, quote_amount)?;

        info!(account = %account, base_amount, quote_amount, unwrap, "emergency withdraw");
        self.record(EventPayload::EmergencyWithdraw(EmergencyWithdrawEvent {
            account,
            base_amount,
            quote_amount,
        }));

        Ok(ExecuteOutcome {
            base_amount,
            quote_amount,
            heap_index: 0,
            margin_called: false,
        })
    }
}
