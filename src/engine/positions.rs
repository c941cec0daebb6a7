// 8.8 engine/positions.rs: leveraged trades through the venue.
// 8.8.1 short sells base the position borrows, long buys base with borrowed quote.
// trading against existing debt closes it first, so a large enough trade flips
// the position to the other side. only the part beyond the old debt pays the swap fee.
// 8.8.2 close and sell-collateral unwind a position and are fee-free.

use super::core::{CallContext, MarginPool};
use super::results::{ExecuteOutcome, PoolError};
use crate::events::{EventPayload, TradeEvent};
use crate::fp96::{mul_div, Fp96};
use crate::position::PositionKind;
use crate::types::{AccountId, Asset};
use crate::venue::{PriceOracle, SwapRequest, SwapRouter};
use primitive_types::U256;
use tracing::debug;

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    fn check_trade(&self, account: AccountId, amount: u128) -> Result<PositionKind, PoolError> {
        let kind = self.state.position_kind(account);
        if kind == PositionKind::Uninitialized {
            return Err(PoolError::UninitializedPosition(account));
        }
        let minimum = self.state.params.position_min_amount;
        if amount < minimum {
            return Err(PoolError::LessThanMinimalAmount { minimum });
        }
        Ok(kind)
    }

    /// Sells `amount` base for at least `limit_price * amount` quote.
    pub(super) fn short(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        amount: u128,
        limit_price: Fp96,
    ) -> Result<ExecuteOutcome, PoolError> {
        let kind_before = self.check_trade(account, amount)?;
        let quote_debt = self.state.real_debt_of(account, Asset::Quote)?;

        let min_out = limit_price.mul_amount(amount)?;
        let request = SwapRequest::exact_input(Asset::Base, amount, min_out, ctx.route);
        let fill = self.swap(&request)?;
        let proceeds = fill.amount_out;

        self.state.check_quote_limit(Asset::Quote, proceeds, quote_debt, ctx.price)?;
        self.state.apply_fill(&request, &fill)?;

        // closing an existing long is free
        let fee = self.state.params.swap_fee_on(proceeds.saturating_sub(quote_debt))?;

        self.state.credit(account, Asset::Quote, proceeds - fee)?;
        self.state.credit(AccountId::FEE_HOLDER, Asset::Quote, fee)?;
        self.state.debit(account, Asset::Base, amount)?;
        self.finish_trade(ctx, account)?;

        let kind_after = self.state.position_kind(account);
        debug!(account = %account, amount, proceeds, fee, %kind_before, %kind_after, "short");
        self.record(EventPayload::Short(TradeEvent {
            account,
            base_amount: amount,
            quote_amount: proceeds,
            fee,
            kind_before,
            kind_after,
        }));

        Ok(ExecuteOutcome {
            base_amount: amount,
            quote_amount: proceeds,
            heap_index: self.state.heap_index_of(account),
            margin_called: false,
        })
    }

    /// Buys `amount` base for at most `limit_price * amount` quote.
    pub(super) fn long(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        amount: u128,
        limit_price: Fp96,
    ) -> Result<ExecuteOutcome, PoolError> {
        let kind_before = self.check_trade(account, amount)?;
        let base_debt = self.state.real_debt_of(account, Asset::Base)?;

        let max_in = limit_price.mul_amount(amount)?;
        let request = SwapRequest::exact_output(Asset::Quote, amount, max_in, ctx.route);
        let fill = self.swap(&request)?;
        let cost = fill.amount_in;

        self.state.check_quote_limit(Asset::Base, amount, base_debt, ctx.price)?;
        self.state.apply_fill(&request, &fill)?;

        // closing an existing short is free: charge the share of cost beyond the old debt
        let charged = if amount > base_debt {
            mul_div(U256::from(cost), U256::from(amount - base_debt), U256::from(amount))?.low_u128()
        } else {
            0
        };
        let fee = self.state.params.swap_fee_on(charged)?;

        self.state.credit(account, Asset::Base, amount)?;
        self.state.debit(account, Asset::Quote, cost + fee)?;
        self.state.credit(AccountId::FEE_HOLDER, Asset::Quote, fee)?;
        self.finish_trade(ctx, account)?;

        let kind_after = self.state.position_kind(account);
        debug!(account = %account, amount, cost, fee, %kind_before, %kind_after, "long");
        self.record(EventPayload::Long(TradeEvent {
            account,
            base_amount: amount,
            quote_amount: cost,
            fee,
            kind_before,
            kind_after,
        }));

        Ok(ExecuteOutcome {
            base_amount: amount,
            quote_amount: cost,
            heap_index: self.state.heap_index_of(account),
            margin_called: false,
        })
    }

    /// Buys back the whole debt with collateral. A short pays at most
    /// `limit_price` quote per base; a long receives at least `limit_price`.
    /// A zero limit bounds the swap by collateral only.
    pub(super) fn close_position(
        &mut self,
        ctx: &CallContext,
        limit_price: Fp96,
    ) -> Result<ExecuteOutcome, PoolError> {
        let account = ctx.caller;
        let kind_before = self.state.position_kind(account);
        let (collateral_asset, debt_asset) = match kind_before {
            PositionKind::Short => (Asset::Quote, Asset::Base),
            PositionKind::Long => (Asset::Base, Asset::Quote),
            PositionKind::Lend => return Err(PoolError::WrongPositionType),
            PositionKind::Uninitialized => return Err(PoolError::UninitializedPosition(account)),
        };

        let debt = self.state.real_debt_of(account, debt_asset)?;
        let collateral = self.state.real_collateral_of(account, collateral_asset)?;
        let price_bound = match debt_asset {
            _ if limit_price.is_zero() => u128::MAX,
            Asset::Base => limit_price.mul_amount(debt)?,
            Asset::Quote => limit_price.recip_mul(debt)?,
        };
        let max_in = price_bound.min(collateral);

        let request = SwapRequest::exact_output(collateral_asset, debt, max_in, ctx.route);
        let fill = self.swap(&request)?;
        self.state.apply_fill(&request, &fill)?;

        self.state.credit(account, debt_asset, debt)?;
        self.state.debit(account, collateral_asset, fill.amount_in)?;
        self.finish_trade(ctx, account)?;

        let kind_after = self.state.position_kind(account);
        let (base_amount, quote_amount) = match debt_asset {
            Asset::Base => (debt, fill.amount_in),
            Asset::Quote => (fill.amount_in, debt),
        };
        debug!(account = %account, base_amount, quote_amount, %kind_after, "position closed");
        self.record(EventPayload::ClosePosition(TradeEvent {
            account,
            base_amount,
            quote_amount,
            fee: 0,
            kind_before,
            kind_after,
        }));

        Ok(ExecuteOutcome {
            base_amount,
            quote_amount,
            heap_index: self.state.heap_index_of(account),
            margin_called: false,
        })
    }

    /// Sells up to `amount` of collateral into the debt asset, proceeds repay debt.
    /// A short pays at most `limit_price` quote per base; a long receives at least `limit_price`.
    pub(super) fn sell_collateral(
        &mut self,
        ctx: &CallContext,
        amount: u128,
        limit_price: Fp96,
    ) -> Result<ExecuteOutcome, PoolError> {
        let account = ctx.caller;
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let kind_before = self.state.position_kind(account);
        let (collateral_asset, debt_asset) = match kind_before {
            PositionKind::Short => (Asset::Quote, Asset::Base),
            PositionKind::Long => (Asset::Base, Asset::Quote),
            PositionKind::Lend => return Err(PoolError::WrongPositionType),
            PositionKind::Uninitialized => return Err(PoolError::UninitializedPosition(account)),
        };

        let sold = amount.min(self.state.real_collateral_of(account, collateral_asset)?);
        if sold == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let min_out = match collateral_asset {
            Asset::Quote if limit_price.is_zero() => 0,
            Asset::Quote => limit_price.recip_mul(sold)?,
            Asset::Base => limit_price.mul_amount(sold)?,
        };

        let request = SwapRequest::exact_input(collateral_asset, sold, min_out, ctx.route);
        let fill = self.swap(&request)?;
        self.state.apply_fill(&request, &fill)?;

        self.state.credit(account, debt_asset, fill.amount_out)?;
        self.state.debit(account, collateral_asset, sold)?;
        self.finish_trade(ctx, account)?;

        let kind_after = self.state.position_kind(account);
        let (base_amount, quote_amount) = match collateral_asset {
            Asset::Quote => (fill.amount_out, sold),
            Asset::Base => (sold, fill.amount_out),
        };
        debug!(account = %account, base_amount, quote_amount, %kind_after, "collateral sold");
        self.record(EventPayload::SellCollateral(TradeEvent {
            account,
            base_amount,
            quote_amount,
            fee: 0,
            kind_before,
            kind_after,
        }));

        Ok(ExecuteOutcome {
            base_amount,
            quote_amount,
            heap_index: self.state.heap_index_of(account),
            margin_called: false,
        })
    }

    /// Heap upkeep and the leverage bound after a trade.
    fn finish_trade(&mut self, ctx: &CallContext, account: AccountId) -> Result<(), PoolError> {
        self.state.sync_heap(account);
        self.state.check_leverage(account, ctx.price)?;
        self.state.prune(account)?;
        self.state.refresh_system_leverage(ctx.price)
    }
}
