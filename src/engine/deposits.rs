// 8.7 engine/deposits.rs: collateral in and out.
// deposits repay debt on the same asset first, withdrawals only ever take collateral.

use super::core::{CallContext, MarginPool};
use super::results::{ExecuteOutcome, PoolError};
use crate::events::{EventPayload, TransferEvent};
use crate::fp96::Fp96;
use crate::position::PositionKind;
use crate::types::{AccountId, Asset};
use crate::venue::{PriceOracle, SwapRouter};
use tracing::debug;

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    /// Deposits `amount` of `asset` into `owner`'s position (the caller's by
    /// default), then opens `leveraged_amount` base of exposure: a long for a
    /// base deposit, a short for a quote deposit.
    pub(super) fn deposit(
        &mut self,
        ctx: &CallContext,
        asset: Asset,
        amount: u128,
        leveraged_amount: u128,
        limit_price: Fp96,
        owner: Option<AccountId>,
    ) -> Result<ExecuteOutcome, PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let owner = owner.unwrap_or(ctx.caller);
        if owner != ctx.caller && (leveraged_amount != 0 || owner.is_fee_holder()) {
            return Err(PoolError::Forbidden);
        }

        let minimum = self.state.params.position_min_amount;
        if self.state.position_kind(owner) == PositionKind::Uninitialized && amount < minimum {
            return Err(PoolError::LessThanMinimalAmount { minimum });
        }

        let repaid_debt = self.state.real_debt_of(owner, asset)?;
        self.state.check_quote_limit(asset, amount, repaid_debt, ctx.price)?;

        let discounted_before = self.state.position(owner).map(|p| p.holding(asset));
        self.state.put_balance(asset, amount)?;
        self.state.credit(owner, asset, amount)?;
        self.state.sync_heap(owner);

        let discounted_after = self.state.position(owner).map(|p| p.holding(asset));
        let discounted_amount = match (discounted_before, discounted_after) {
            (Some(before), Some(after)) if !before.is_debt() => {
                after.collateral().saturating_sub(before.collateral())
            }
            (_, Some(after)) => after.collateral(),
            _ => 0,
        };
        debug!(account = %ctx.caller, owner = %owner, asset = ?asset, amount, "deposit");

        let event = TransferEvent {
            account: ctx.caller,
            position_owner: owner,
            amount,
            discounted_amount,
        };
        self.record(match asset {
            Asset::Base => EventPayload::DepositBase(event),
            Asset::Quote => EventPayload::DepositQuote(event),
        });

        let mut outcome = ExecuteOutcome::default();
        match asset {
            Asset::Base => outcome.base_amount = amount,
            Asset::Quote => outcome.quote_amount = amount,
        }

        if leveraged_amount != 0 {
            let trade = match asset {
                Asset::Base => self.long(ctx, owner, leveraged_amount, limit_price)?,
                Asset::Quote => self.short(ctx, owner, leveraged_amount, limit_price)?,
            };
            return Ok(ExecuteOutcome {
                base_amount: outcome.base_amount + trade.base_amount,
                quote_amount: outcome.quote_amount + trade.quote_amount,
                ..trade
            });
        }

        outcome.heap_index = self.state.heap_index_of(owner);
        Ok(outcome)
    }

    /// Withdraws collateral. `u128::MAX` takes all of it.
    pub(super) fn withdraw(
        &mut self,
        ctx: &CallContext,
        asset: Asset,
        amount: u128,
        unwrap: bool,
    ) -> Result<ExecuteOutcome, PoolError> {
        let account = ctx.caller;
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let kind = self.state.position_kind(account);
        match (kind, asset) {
            (PositionKind::Uninitialized, _) => return Err(PoolError::UninitializedPosition(account)),
            // the debt side holds no collateral to take
            (PositionKind::Short, Asset::Base) | (PositionKind::Long, Asset::Quote) => {
                return Err(PoolError::WrongPositionType)
            }
            _ => {}
        }

        let available = self.state.real_collateral_of(account, asset)?;
        let real = if amount == u128::MAX {
            available
        } else if amount > available {
            return Err(PoolError::ExceedsLimit);
        } else {
            amount
        };

        let remaining = available - real;
        let minimum = self.state.params.position_min_amount;
        if remaining != 0 && remaining < minimum {
            return Err(PoolError::LessThanMinimalAmount { minimum });
        }

        let discounted_before = self
            .state
            .position(account)
            .map(|p| p.holding(asset).collateral())
            .unwrap_or(0);
        self.state.debit(account, asset, real)?;
        self.state.take_balance(asset, real)?;
        self.state.sync_heap(account);
        self.state.check_leverage(account, ctx.price)?;

        let discounted_after = self
            .state
            .position(account)
            .map(|p| p.holding(asset).collateral())
            .unwrap_or(0);
        self.state.prune(account)?;

        debug!(account = %account, asset = ?asset, amount = real, unwrap, "withdraw");
        let event = TransferEvent {
            account,
            position_owner: account,
            amount: real,
            discounted_amount: discounted_before - discounted_after,
        };
        self.record(match asset {
            Asset::Base => EventPayload::WithdrawBase(event),
            Asset::Quote => EventPayload::WithdrawQuote(event),
        });

        let mut outcome = ExecuteOutcome {
            heap_index: self.state.heap_index_of(account),
            ..ExecuteOutcome::default()
        };
        match asset {
            Asset::Base => outcome.base_amount = real,
            Asset::Quote => outcome.quote_amount = real,
        }
        Ok(outcome)
    }
}
