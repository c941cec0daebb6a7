// 8.6 engine/liquidations.rs: forced margin calls and third-party takeover.
// 8.6.1 a margin call sells all of a position's collateral for its debt asset.
// proceeds above the debt go to that asset's lenders. collateral the pool
// cannot sell (lent out, venue down, fill below the floor) is kept in kind.
// 8.6.2 an unrecovered debt is netted against the borrowers of the other
// asset: their collateral in the unpaid asset is cut pro rata to their debt and
// the kept collateral writes that debt down. if they cannot take it the
// remaining borrowers of the same asset take it on; with neither, emergency.

use super::core::{CallContext, MarginPool};
use super::results::{ExecuteOutcome, PoolError};
use crate::events::{DeleverageEvent, EventPayload, LossAbsorber, MarginCallEvent, ReceivePositionEvent};
use crate::fp96::{mul_div_up, q96, Fp96};
use crate::position::PositionKind;
use crate::types::{AccountId, Asset};
use crate::venue::{PriceOracle, SwapRequest, SwapRouter};
use primitive_types::U256;
use tracing::{info, warn};

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    /// Liquidates `account`. Never fails on the venue or on pool liquidity.
    pub(super) fn margin_call(&mut self, ctx: &CallContext, account: AccountId) -> Result<(), PoolError> {
        let position = self
            .state
            .position(account)
            .cloned()
            .ok_or(PoolError::UninitializedPosition(account))?;
        let kind = position.kind();
        let (collateral_asset, debt_asset) = match kind {
            PositionKind::Short => (Asset::Quote, Asset::Base),
            PositionKind::Long => (Asset::Base, Asset::Quote),
            PositionKind::Lend | PositionKind::Uninitialized => {
                return Err(PoolError::WrongPositionType)
            }
        };

        let seized = self.state.collateral_in(&position, collateral_asset)?;
        let debt = self.state.debt_in(&position, debt_asset)?;
        self.state.remove_position(account)?;

        let (surplus, shortfall, kept) = match self.sell_seized(ctx, account, collateral_asset, seized)? {
            Some(proceeds) if proceeds >= debt => (proceeds - debt, 0, 0),
            Some(proceeds) => (0, debt - proceeds, 0),
            None => (0, debt, seized),
        };

        if surplus > 0 {
            self.distribute(debt_asset, surplus)?;
        }

        info!(
            account = %account,
            %kind,
            seized,
            debt,
            surplus,
            shortfall,
            "position margin called"
        );
        self.record(EventPayload::MarginCall(MarginCallEvent {
            account,
            kind,
            collateral_seized: seized,
            debt_closed: debt,
            surplus,
            shortfall,
        }));

        if shortfall > 0 {
            self.deleverage(ctx, debt_asset, shortfall, kept)?;
        }
        Ok(())
    }

    /// Sells seized collateral into the other asset. `None` when it stays in
    /// kind: the pool does not hold that much of it, or the venue cannot fill
    /// at the liquidation floor.
    fn sell_seized(
        &mut self,
        ctx: &CallContext,
        account: AccountId,
        asset: Asset,
        seized: u128,
    ) -> Result<Option<u128>, PoolError> {
        if seized == 0 {
            return Ok(Some(0));
        }
        let balance = self.state.ledger(asset).balance;
        if balance < seized {
            warn!(account = %account, %asset, seized, balance, "seized collateral is lent out, kept in kind");
            return Ok(None);
        }

        let oracle_value = match asset {
            Asset::Quote => ctx.price.recip_mul(seized)?,
            Asset::Base => ctx.price.mul_amount(seized)?,
        };
        let min_out = self.state.params.mc_floor(oracle_value)?;
        let request = SwapRequest::exact_input(asset, seized, min_out, ctx.route);
        match self.swap(&request) {
            Ok(fill) => {
                self.state.apply_fill(&request, &fill)?;
                Ok(Some(fill.amount_out))
            }
            Err(err) => {
                warn!(account = %account, %err, seized, "liquidation swap failed, kept in kind");
                Ok(None)
            }
        }
    }

    /// Adds `amount` of real value to every `asset` lender pro rata. With no
    /// lenders it goes to the fee holder.
    fn distribute(&mut self, asset: Asset, amount: u128) -> Result<(), PoolError> {
        if amount == 0 {
            return Ok(());
        }
        let ledger = self.state.ledger_mut(asset);
        if ledger.discounted_collateral == 0 {
            return self.state.credit(AccountId::FEE_HOLDER, asset, amount);
        }
        let per_unit = Fp96::from_ratio(amount, ledger.discounted_collateral)?;
        ledger.collateral_coeff = ledger.collateral_coeff.add(per_unit)?;
        Ok(())
    }

    /// Places `shortfall` of `asset` that a liquidation could not repay.
    /// `kept` is the liquidated collateral, in the other asset, still in the pool.
    fn deleverage(&mut self, ctx: &CallContext, asset: Asset, shortfall: u128, kept: u128) -> Result<(), PoolError> {
        let other = asset.other();
        let owed = self.state.ledger(other).discounted_debt;
        let capacity = self.state.collateral_of_borrowers(asset)?;
        if owed > 0 && shortfall < capacity {
            return self.net_against_borrowers(asset, shortfall, kept);
        }

        // nobody to net against: the kept collateral goes to its lenders
        self.distribute(other, kept)?;
        let same_side = self.state.ledger(asset).discounted_debt;
        if same_side == 0 {
            warn!(%asset, shortfall, capacity, "no borrower can absorb the shortfall");
            return self.trip_emergency(ctx, asset);
        }

        let per_unit = mul_div_up(U256::from(shortfall), q96(), U256::from(same_side))?;
        let ledger = self.state.ledger_mut(asset);
        ledger.debt_coeff = ledger.debt_coeff.add(Fp96::from_inner(per_unit))?;
        let delev_coeff = ledger.delev_coeff;

        warn!(%asset, shortfall, "shortfall spread over remaining borrowers");
        self.record(EventPayload::Deleverage(DeleverageEvent {
            asset,
            shortfall,
            absorbed_by: LossAbsorber::SameSide,
            debt_relieved: 0,
            delev_coeff,
        }));
        Ok(())
    }

    /// Cuts the `asset` collateral of every borrower of the other asset by
    /// `shortfall` in total, pro rata to their debt, and writes `kept` off that debt.
    fn net_against_borrowers(&mut self, asset: Asset, shortfall: u128, kept: u128) -> Result<(), PoolError> {
        let other = asset.other();
        let owed = self.state.ledger(other).discounted_debt;

        let cut = mul_div_up(U256::from(shortfall), q96(), U256::from(owed))?;
        let ledger = self.state.ledger_mut(asset);
        ledger.delev_coeff = ledger.delev_coeff.add(Fp96::from_inner(cut))?;
        let delev_coeff = ledger.delev_coeff;

        // at least one unit of debt stays so the debt index never reaches zero
        let relieved = kept.min(self.state.ledger(other).total_real_debt()?.saturating_sub(1));
        if relieved > 0 {
            let per_unit = Fp96::from_ratio(relieved, owed)?;
            let ledger = self.state.ledger_mut(other);
            ledger.debt_relief = ledger.debt_relief.add(per_unit)?;
        }
        self.distribute(other, kept - relieved)?;

        warn!(%asset, shortfall, relieved, %delev_coeff, "shortfall netted against borrowers");
        self.record(EventPayload::Deleverage(DeleverageEvent {
            asset,
            shortfall,
            absorbed_by: LossAbsorber::Counterparties,
            debt_relieved: relieved,
            delev_coeff,
        }));
        Ok(())
    }

    /// The caller takes over a position that is over the leverage bound,
    /// paying `quote_amount` and `base_amount` into it.
    pub(super) fn receive_position(
        &mut self,
        ctx: &CallContext,
        bad_account: AccountId,
        quote_amount: u128,
        base_amount: u128,
    ) -> Result<ExecuteOutcome, PoolError> {
        let receiver = ctx.caller;
        if self.state.position_kind(receiver) != PositionKind::Uninitialized {
            return Err(PoolError::PositionInitialized(receiver));
        }
        let bad = self
            .state
            .position(bad_account)
            .cloned()
            .ok_or(PoolError::NotLiquidatable(bad_account))?;
        if !bad.is_leveraged() || !self.state.is_liquidatable(&bad, ctx.price)? {
            return Err(PoolError::NotLiquidatable(bad_account));
        }

        // the holdings and the heap node change hands as they are
        let (kind, slot) = (bad.kind(), bad.heap_index);
        self.state.touch(receiver);
        self.state.touch(bad_account);
        self.state.positions.remove(&receiver);
        self.state.positions.remove(&bad_account);
        self.state.positions.insert(receiver, bad);
        let heap = match kind {
            PositionKind::Long => &mut self.state.long_heap,
            _ => &mut self.state.short_heap,
        };
        heap.set_account(slot, receiver);

        self.state.put_balance(Asset::Quote, quote_amount)?;
        self.state.put_balance(Asset::Base, base_amount)?;
        self.state.credit(receiver, Asset::Quote, quote_amount)?;
        self.state.credit(receiver, Asset::Base, base_amount)?;
        self.state.sync_heap(receiver);
        self.state.check_leverage(receiver, ctx.price)?;
        self.state.refresh_system_leverage(ctx.price)?;

        let kind_after = self.state.position_kind(receiver);
        info!(
            liquidator = %receiver,
            liquidated = %bad_account,
            %kind_after,
            quote_amount,
            base_amount,
            "position received"
        );
        self.record(EventPayload::ReceivePosition(ReceivePositionEvent {
            liquidator: receiver,
            liquidated: bad_account,
            kind_after,
            quote_amount,
            base_amount,
        }));

        Ok(ExecuteOutcome {
            base_amount,
            quote_amount,
            heap_index: self.state.heap_index_of(receiver),
            margin_called: false,
        })
    }
}
