// 8.4 engine/ledger.rs: discounted balances and the two primitives every
// operation is built from. credit repays debt first then adds collateral,
// debit consumes collateral first then adds debt. heap membership follows the
// derived position kind and is reconciled with sync_heap after each change.
// 8.4.1 deleverage charges a position's collateral per unit of what it owes in
// the other asset. when that debt changes the collateral is rebased so the
// charge already taken stays taken and new debt starts uncharged.

use super::core::{AssetLedger, PoolState, StateUndo};
use super::results::{PoolError, SystemLeverage};
use crate::fp96::{mul_div, mul_div_up, to_u128, Fp96, MathError};
use crate::heap::LeverageHeap;
use crate::position::{Holding, Position, PositionKind};
use crate::types::{AccountId, Asset};
use crate::venue::{SwapFill, SwapRequest};
use primitive_types::U256;
use std::collections::HashMap;

fn add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

fn sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `collateral / (collateral - debt)`; unbounded when there is no equity.
pub(super) fn leverage_of(collateral: u128, debt: u128) -> Result<Fp96, PoolError> {
    if collateral <= debt {
        return Ok(Fp96::max_value());
    }
    Ok(Fp96::from_ratio(collateral, collateral - debt)?)
}

impl AssetLedger {
    /// Debt index net of deleverage write-offs.
    pub fn effective_debt_coeff(&self) -> Result<Fp96, PoolError> {
        Ok(self.debt_coeff.sub(self.debt_relief)?)
    }

    /// Collateral before any deleverage charge.
    pub fn real_collateral(&self, discounted: u128) -> Result<u128, PoolError> {
        Ok(self.collateral_coeff.mul_amount(discounted)?)
    }

    /// Deleverage charge on a position owing `other_debt` discounted units of the other asset.
    pub fn delev_charge(&self, other_debt: u128) -> Result<u128, PoolError> {
        if other_debt == 0 || self.delev_coeff.is_zero() {
            return Ok(0);
        }
        Ok(self.delev_coeff.mul_amount_up(other_debt)?)
    }

    pub fn net_collateral(&self, discounted: u128, other_debt: u128) -> Result<u128, PoolError> {
        Ok(self
            .real_collateral(discounted)?
            .saturating_sub(self.delev_charge(other_debt)?))
    }

    pub fn real_debt(&self, discounted: u128) -> Result<u128, PoolError> {
        Ok(self.effective_debt_coeff()?.mul_amount(discounted)?)
    }

    pub fn total_real_debt(&self) -> Result<u128, PoolError> {
        self.real_debt(self.discounted_debt)
    }

    fn credit_holding(&mut self, holding: Holding, real: u128) -> Result<Holding, PoolError> {
        match holding {
            Holding::Debt(debt) if debt > 0 => {
                let real_debt = self.real_debt(debt)?;
                if real < real_debt {
                    let repaid = self.effective_debt_coeff()?.recip_mul(real)?;
                    self.discounted_debt = sub(self.discounted_debt, repaid)?;
                    return Ok(Holding::Debt(sub(debt, repaid)?));
                }
                self.discounted_debt = sub(self.discounted_debt, debt)?;
                let added = self.collateral_coeff.recip_mul(real - real_debt)?;
                self.discounted_collateral = add(self.discounted_collateral, added)?;
                Ok(Holding::Collateral(added))
            }
            other => {
                let added = self.collateral_coeff.recip_mul(real)?;
                self.discounted_collateral = add(self.discounted_collateral, added)?;
                Ok(Holding::Collateral(add(other.collateral(), added)?))
            }
        }
    }

    /// `charge` is the deleverage charge already standing against the holding.
    fn debit_holding(&mut self, holding: Holding, real: u128, charge: u128) -> Result<Holding, PoolError> {
        match holding {
            Holding::Collateral(collateral) if collateral > 0 => {
                let real_collateral = self.real_collateral(collateral)?.saturating_sub(charge);
                if real < real_collateral {
                    let removed = self.collateral_coeff.recip_mul_up(real)?.min(collateral);
                    self.discounted_collateral = sub(self.discounted_collateral, removed)?;
                    return Ok(Holding::Collateral(collateral - removed));
                }
                self.discounted_collateral = sub(self.discounted_collateral, collateral)?;
                let added = self.effective_debt_coeff()?.recip_mul_up(real - real_collateral)?;
                self.discounted_debt = add(self.discounted_debt, added)?;
                Ok(Holding::Debt(added))
            }
            other => {
                let added = self.effective_debt_coeff()?.recip_mul_up(real)?;
                self.discounted_debt = add(self.discounted_debt, added)?;
                Ok(Holding::Debt(add(other.debt(), added)?))
            }
        }
    }

    /// Drops a holding from the aggregates.
    fn release(&mut self, holding: Holding) -> Result<(), PoolError> {
        match holding {
            Holding::Collateral(amount) => {
                self.discounted_collateral = sub(self.discounted_collateral, amount)?
            }
            Holding::Debt(amount) => self.discounted_debt = sub(self.discounted_debt, amount)?,
        }
        Ok(())
    }
}

/// Adjusts `holding` (collateral in `ledger`'s asset) after the same
/// position's debt in the other asset went from `before` to `after`, keeping
/// its net real value where it was.
fn rebase_charge(ledger: &mut AssetLedger, holding: &mut Holding, before: u128, after: u128) -> Result<(), PoolError> {
    if ledger.delev_coeff.is_zero() || before == after {
        return Ok(());
    }
    let Holding::Collateral(collateral) = *holding else {
        return Ok(());
    };
    let delev = ledger.delev_coeff.inner();
    let coeff = ledger.collateral_coeff.inner();
    let rebased = if after > before {
        let added = to_u128(mul_div(delev, U256::from(after - before), coeff)?)?;
        ledger.discounted_collateral = add(ledger.discounted_collateral, added)?;
        add(collateral, added)?
    } else {
        let removed = to_u128(mul_div_up(delev, U256::from(before - after), coeff)?)?.min(collateral);
        ledger.discounted_collateral = sub(ledger.discounted_collateral, removed)?;
        collateral - removed
    };
    *holding = Holding::Collateral(rebased);
    Ok(())
}

fn heap_mut<'a>(
    short_heap: &'a mut LeverageHeap,
    long_heap: &'a mut LeverageHeap,
    kind: PositionKind,
) -> &'a mut LeverageHeap {
    match kind {
        PositionKind::Long => long_heap,
        _ => short_heap,
    }
}

fn set_slot(
    positions: &mut HashMap<AccountId, Position>,
    undo: &mut Option<StateUndo>,
    account: AccountId,
    slot: u32,
) {
    if let Some(position) = positions.get_mut(&account) {
        if let Some(undo) = undo.as_mut() {
            undo.positions
                .entry(account)
                .or_insert_with(|| Some(position.clone()));
        }
        position.heap_index = slot;
    }
}

impl PoolState {
    /// The ledger of `asset`, the other ledger and the positions, borrowed together.
    fn split_mut(
        &mut self,
        asset: Asset,
    ) -> (&mut AssetLedger, &mut AssetLedger, &mut HashMap<AccountId, Position>) {
        match asset {
            Asset::Base => (&mut self.base, &mut self.quote, &mut self.positions),
            Asset::Quote => (&mut self.quote, &mut self.base, &mut self.positions),
        }
    }

    pub(super) fn credit(&mut self, account: AccountId, asset: Asset, real: u128) -> Result<(), PoolError> {
        if real == 0 {
            return Ok(());
        }
        self.touch(account);
        let (ledger, other_ledger, positions) = self.split_mut(asset);
        let position = positions.entry(account).or_default();
        let before = position.holding(asset);
        let after = ledger.credit_holding(before, real)?.normalized();
        *position.holding_mut(asset) = after;
        rebase_charge(
            other_ledger,
            position.holding_mut(asset.other()),
            before.debt(),
            after.debt(),
        )
    }

    /// Fails with `BadLeverage` if the account would owe both assets.
    pub(super) fn debit(&mut self, account: AccountId, asset: Asset, real: u128) -> Result<(), PoolError> {
        if real == 0 {
            return Ok(());
        }
        self.touch(account);
        let (ledger, other_ledger, positions) = self.split_mut(asset);
        let position = positions.entry(account).or_default();
        let before = position.holding(asset);
        let charge = ledger.delev_charge(position.holding(asset.other()).debt())?;
        let after = ledger.debit_holding(before, real, charge)?.normalized();
        *position.holding_mut(asset) = after;
        rebase_charge(
            other_ledger,
            position.holding_mut(asset.other()),
            before.debt(),
            after.debt(),
        )?;
        if position.base.is_debt() && position.quote.is_debt() {
            return Err(PoolError::BadLeverage);
        }
        Ok(())
    }

    pub(super) fn take_balance(&mut self, asset: Asset, amount: u128) -> Result<(), PoolError> {
        let ledger = self.ledger_mut(asset);
        ledger.balance = ledger
            .balance
            .checked_sub(amount)
            .ok_or(PoolError::ExceedsLimit)?;
        Ok(())
    }

    pub(super) fn put_balance(&mut self, asset: Asset, amount: u128) -> Result<(), PoolError> {
        let ledger = self.ledger_mut(asset);
        ledger.balance = add(ledger.balance, amount)?;
        Ok(())
    }

    /// Moves pool balances the way an executed swap did.
    pub(super) fn apply_fill(&mut self, request: &SwapRequest, fill: &SwapFill) -> Result<(), PoolError> {
        self.take_balance(request.token_in, fill.amount_in)?;
        self.put_balance(request.token_out, fill.amount_out)
    }

    /// Fails when the pool's `asset` balance plus `incoming` is worth more than
    /// `quote_limit`, unless all of `incoming` repays existing debt.
    pub(super) fn check_quote_limit(
        &self,
        asset: Asset,
        incoming: u128,
        repaid_debt: u128,
        price: Fp96,
    ) -> Result<(), PoolError> {
        if incoming <= repaid_debt {
            return Ok(());
        }
        let balance = add(self.ledger(asset).balance, incoming)?;
        let value = match asset {
            Asset::Base => price.mul_amount(balance)?,
            Asset::Quote => balance,
        };
        if value > self.params.quote_limit {
            return Err(PoolError::ExceedsLimit);
        }
        Ok(())
    }

    /// Real collateral of `position` on `asset`, net of its deleverage charge.
    pub fn collateral_in(&self, position: &Position, asset: Asset) -> Result<u128, PoolError> {
        self.ledger(asset).net_collateral(
            position.holding(asset).collateral(),
            position.holding(asset.other()).debt(),
        )
    }

    pub fn debt_in(&self, position: &Position, asset: Asset) -> Result<u128, PoolError> {
        self.ledger(asset).real_debt(position.holding(asset).debt())
    }

    /// Real debt `account` owes on `asset`, zero if it holds collateral there.
    pub(super) fn real_debt_of(&self, account: AccountId, asset: Asset) -> Result<u128, PoolError> {
        match self.positions.get(&account) {
            Some(position) => self.debt_in(position, asset),
            None => Ok(0),
        }
    }

    pub(super) fn real_collateral_of(&self, account: AccountId, asset: Asset) -> Result<u128, PoolError> {
        match self.positions.get(&account) {
            Some(position) => self.collateral_in(position, asset),
            None => Ok(0),
        }
    }

    /// All real `asset` collateral in the pool, net of deleverage charges.
    pub fn total_collateral(&self, asset: Asset) -> Result<u128, PoolError> {
        let ledger = self.ledger(asset);
        let charged = ledger.delev_charge(self.ledger(asset.other()).discounted_debt)?;
        Ok(ledger
            .real_collateral(ledger.discounted_collateral)?
            .saturating_sub(charged))
    }

    /// `asset` collateral held by the positions that owe the other asset.
    pub(super) fn collateral_of_borrowers(&self, asset: Asset) -> Result<u128, PoolError> {
        let mut total: u128 = 0;
        for (_, node) in self.heap_for_debt(asset.other()).iter() {
            if let Some(position) = self.positions.get(&node.account) {
                total = add(total, self.collateral_in(position, asset)?)?;
            }
        }
        Ok(total)
    }

    /// Which heap holds `account` at `slot`, if any.
    fn heap_side(&self, account: AccountId, slot: u32) -> Option<PositionKind> {
        if self.short_heap.get(slot).map(|n| n.account) == Some(account) {
            Some(PositionKind::Short)
        } else if self.long_heap.get(slot).map(|n| n.account) == Some(account) {
            Some(PositionKind::Long)
        } else {
            None
        }
    }

    /// Puts the account's position in the heap its kind calls for, at the
    /// right rank, and out of the other one.
    pub(super) fn sync_heap(&mut self, account: AccountId) {
        let Some(position) = self.positions.get(&account) else {
            return;
        };
        let node = position.heap_node(account);
        let slot = position.heap_index;
        let current = self.heap_side(account, slot);
        let target = match position.kind() {
            kind @ (PositionKind::Short | PositionKind::Long) => Some(kind),
            _ => None,
        };

        let positions = &mut self.positions;
        let undo = &mut self.undo;
        let mut on_move = |moved: AccountId, new_slot: u32| set_slot(positions, undo, moved, new_slot);

        if current == target {
            if let Some(kind) = target {
                heap_mut(&mut self.short_heap, &mut self.long_heap, kind).update_key(
                    slot,
                    node.key,
                    &mut on_move,
                );
            }
            return;
        }
        if let Some(kind) = current {
            heap_mut(&mut self.short_heap, &mut self.long_heap, kind).remove(slot, &mut on_move);
        }
        if let Some(kind) = target {
            heap_mut(&mut self.short_heap, &mut self.long_heap, kind).insert(node, &mut on_move);
        }
    }

    /// Drops an account's position: its holdings leave the aggregates and its
    /// heap node is removed.
    pub(super) fn remove_position(&mut self, account: AccountId) -> Result<Option<Position>, PoolError> {
        let Some(position) = self.positions.get(&account).cloned() else {
            return Ok(None);
        };
        self.touch(account);
        self.base.release(position.base)?;
        self.quote.release(position.quote)?;

        if let Some(kind) = self.heap_side(account, position.heap_index) {
            let positions = &mut self.positions;
            let undo = &mut self.undo;
            heap_mut(&mut self.short_heap, &mut self.long_heap, kind).remove(
                position.heap_index,
                |moved, slot| set_slot(positions, undo, moved, slot),
            );
        }
        Ok(self.positions.remove(&account))
    }

    /// Drops the account's position if it holds nothing.
    pub(super) fn prune(&mut self, account: AccountId) -> Result<(), PoolError> {
        if self.position_kind(account) == PositionKind::Uninitialized {
            self.remove_position(account)?;
        }
        Ok(())
    }

    /// Leverage at `price`. Short: quote collateral against base debt;
    /// long: base collateral against quote debt, both valued in quote.
    pub fn position_leverage(&self, position: &Position, price: Fp96) -> Result<Fp96, PoolError> {
        let (collateral, debt) = match position.kind() {
            PositionKind::Short => (
                self.collateral_in(position, Asset::Quote)?,
                price.mul_amount(self.debt_in(position, Asset::Base)?)?,
            ),
            PositionKind::Long => (
                price.mul_amount(self.collateral_in(position, Asset::Base)?)?,
                self.debt_in(position, Asset::Quote)?,
            ),
            PositionKind::Lend | PositionKind::Uninitialized => return Ok(Fp96::one()),
        };
        leverage_of(collateral, debt)
    }

    pub fn is_liquidatable(&self, position: &Position, price: Fp96) -> Result<bool, PoolError> {
        Ok(self.position_leverage(position, price)? > self.params.max_leverage_x96())
    }

    pub(super) fn check_leverage(&self, account: AccountId, price: Fp96) -> Result<(), PoolError> {
        match self.positions.get(&account) {
            Some(position) if self.is_liquidatable(position, price)? => Err(PoolError::BadLeverage),
            _ => Ok(()),
        }
    }

    /// Uncapped leverage of the side borrowing `debt_asset`. One when the side has no collateral.
    pub fn system_leverage_uncapped(&self, debt_asset: Asset, price: Fp96) -> Result<Fp96, PoolError> {
        let (collateral, debt) = match debt_asset {
            Asset::Base => (
                self.total_collateral(Asset::Quote)?,
                price.mul_amount(self.base.total_real_debt()?)?,
            ),
            Asset::Quote => (
                price.mul_amount(self.total_collateral(Asset::Base)?)?,
                self.quote.total_real_debt()?,
            ),
        };
        if collateral == 0 {
            return Ok(Fp96::one());
        }
        leverage_of(collateral, debt)
    }

    pub(super) fn refresh_system_leverage(&mut self, price: Fp96) -> Result<(), PoolError> {
        let max = self.params.max_leverage_x96();
        self.system_leverage = SystemLeverage {
            short: self.system_leverage_uncapped(Asset::Base, price)?.min(max),
            long: self.system_leverage_uncapped(Asset::Quote, price)?.min(max),
        };
        Ok(())
    }

    /// Collateral minus debt in quote at `price`, floored at zero.
    pub fn net_value(&self, position: &Position, price: Fp96) -> Result<u128, PoolError> {
        let assets = add(
            price.mul_amount(self.collateral_in(position, Asset::Base)?)?,
            self.collateral_in(position, Asset::Quote)?,
        )?;
        let liabilities = add(
            price.mul_amount(self.debt_in(position, Asset::Base)?)?,
            self.debt_in(position, Asset::Quote)?,
        )?;
        Ok(assets.saturating_sub(liabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolParams;
    use crate::types::Timestamp;

    fn state() -> PoolState {
        PoolState::new(PoolParams::testnet(), Timestamp::from_secs(0))
    }

    #[test]
    fn credit_then_debit_round_trip() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        assert_eq!(s.quote.discounted_collateral, 1_000);
        assert_eq!(s.position_kind(a), PositionKind::Lend);

        s.debit(a, Asset::Quote, 1_000).unwrap();
        assert_eq!(s.quote.discounted_collateral, 0);
        assert_eq!(s.position_kind(a), PositionKind::Uninitialized);
    }

    #[test]
    fn debit_past_collateral_opens_debt() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        s.debit(a, Asset::Base, 400).unwrap();
        s.sync_heap(a);

        let p = s.position(a).unwrap();
        assert_eq!(p.kind(), PositionKind::Short);
        assert_eq!(p.base, Holding::Debt(400));
        assert_eq!(p.heap_index, 1);
        assert_eq!(s.base.discounted_debt, 400);
        assert_eq!(s.short_heap.len(), 1);
    }

    #[test]
    fn credit_repays_before_collateral() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        s.debit(a, Asset::Base, 400).unwrap();
        s.sync_heap(a);

        s.credit(a, Asset::Base, 500).unwrap();
        s.sync_heap(a);
        let p = s.position(a).unwrap();
        assert_eq!(p.base, Holding::Collateral(100));
        assert_eq!(p.kind(), PositionKind::Lend);
        assert_eq!(p.heap_index, 0);
        assert_eq!(s.base.discounted_debt, 0);
        assert!(s.short_heap.is_empty());
    }

    #[test]
    fn debt_on_both_assets_rejected() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 100).unwrap();
        s.debit(a, Asset::Base, 50).unwrap();
        let err = s.debit(a, Asset::Quote, 200).unwrap_err();
        assert_eq!(err, PoolError::BadLeverage);
    }

    #[test]
    fn flip_moves_heaps() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        s.debit(a, Asset::Base, 400).unwrap();
        s.sync_heap(a);

        s.credit(a, Asset::Base, 600).unwrap();
        s.debit(a, Asset::Quote, 1_100).unwrap();
        s.sync_heap(a);

        let p = s.position(a).unwrap();
        assert_eq!(p.kind(), PositionKind::Long);
        assert!(s.short_heap.is_empty());
        assert_eq!(s.long_heap.get(p.heap_index).unwrap().account, a);
    }

    #[test]
    fn leverage_of_short() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        s.debit(a, Asset::Base, 750).unwrap();
        let p = s.position(a).unwrap().clone();
        // 1000 / (1000 - 750)
        assert_eq!(s.position_leverage(&p, Fp96::one()).unwrap(), Fp96::from_int(4));
        assert_eq!(s.position_leverage(&p, Fp96::from_int(2)).unwrap(), Fp96::max_value());
    }

    #[test]
    fn delev_charges_collateral_per_unit_of_other_debt() {
        let mut s = state();
        let (lender, long) = (AccountId(5), AccountId(6));
        s.credit(lender, Asset::Base, 1_000).unwrap();
        s.credit(long, Asset::Base, 1_000).unwrap();
        s.debit(long, Asset::Quote, 500).unwrap();
        s.base.delev_coeff = Fp96::from_ratio(1, 4).unwrap();

        // only the borrower of quote pays, 0.25 base per quote owed
        assert_eq!(s.real_collateral_of(lender, Asset::Base).unwrap(), 1_000);
        assert_eq!(s.real_collateral_of(long, Asset::Base).unwrap(), 875);
        assert_eq!(s.total_collateral(Asset::Base).unwrap(), 1_875);
        assert_eq!(s.collateral_of_borrowers(Asset::Base).unwrap(), 0); // not synced into a heap yet
        s.sync_heap(long);
        assert_eq!(s.collateral_of_borrowers(Asset::Base).unwrap(), 875);
    }

    #[test]
    fn debt_change_leaves_charge_in_place() {
        let mut s = state();
        let long = AccountId(6);
        s.credit(AccountId(5), Asset::Base, 1_000).unwrap();
        s.credit(long, Asset::Base, 1_000).unwrap();
        s.debit(long, Asset::Quote, 500).unwrap();
        s.base.delev_coeff = Fp96::from_ratio(1, 4).unwrap();

        // new debt is not charged for the earlier loss
        s.debit(long, Asset::Quote, 500).unwrap();
        assert_eq!(s.position(long).unwrap().base, Holding::Collateral(1_125));
        assert_eq!(s.real_collateral_of(long, Asset::Base).unwrap(), 875);
        assert_eq!(s.total_collateral(Asset::Base).unwrap(), 1_875);

        // repaying does not hand the charge back
        s.credit(long, Asset::Quote, 1_000).unwrap();
        assert_eq!(s.position_kind(long), PositionKind::Lend);
        assert_eq!(s.real_collateral_of(long, Asset::Base).unwrap(), 875);
        assert_eq!(s.total_collateral(Asset::Base).unwrap(), 1_875);
        assert_eq!(s.base.discounted_collateral, 1_875);
    }

    #[test]
    fn debt_relief_reduces_real_debt() {
        let mut s = state();
        let long = AccountId(6);
        s.credit(long, Asset::Base, 1_000).unwrap();
        s.debit(long, Asset::Quote, 400).unwrap();
        s.quote.debt_relief = Fp96::from_ratio(1, 4).unwrap();

        assert_eq!(s.real_debt_of(long, Asset::Quote).unwrap(), 300);
        assert_eq!(s.quote.total_real_debt().unwrap(), 300);

        s.credit(long, Asset::Quote, 300).unwrap();
        assert_eq!(s.position(long).unwrap().quote, Holding::Collateral(0));
        assert_eq!(s.quote.discounted_debt, 0);
    }

    #[test]
    fn stored_system_leverage_is_capped() {
        let mut s = state();
        let a = AccountId(5);
        s.credit(a, Asset::Quote, 1_000).unwrap();
        s.debit(a, Asset::Base, 960).unwrap();

        // 1000 / (1000 - 960), above the testnet bound of 20
        let uncapped = s.system_leverage_uncapped(Asset::Base, Fp96::one()).unwrap();
        assert_eq!(uncapped, Fp96::from_int(25));

        s.refresh_system_leverage(Fp96::one()).unwrap();
        assert_eq!(s.system_leverage().short, s.params.max_leverage_x96());
        assert!(s.system_leverage().short < uncapped);
        assert_eq!(s.system_leverage().long, Fp96::one());
    }

    #[test]
    fn rollback_restores_touched_positions_and_heaps() {
        let mut s = state();
        for i in 0..12u64 {
            let account = AccountId(100 + i);
            s.credit(account, Asset::Quote, 1_000).unwrap();
            s.debit(account, Asset::Base, 100 + 50 * i as u128).unwrap();
            s.sync_heap(account);
        }
        let before = s.clone();

        s.begin();
        s.remove_position(AccountId(111)).unwrap();
        s.remove_position(AccountId(104)).unwrap();
        s.credit(AccountId(100), Asset::Base, 100).unwrap();
        s.sync_heap(AccountId(100));
        s.credit(AccountId(200), Asset::Quote, 500).unwrap();
        s.debit(AccountId(200), Asset::Base, 450).unwrap();
        s.sync_heap(AccountId(200));
        s.base.balance = 7;
        assert_ne!(s, before);

        s.rollback();
        assert_eq!(s, before);
        assert!(s.position(AccountId(200)).is_none());
        for (slot, node) in s.short_heap.iter() {
            assert_eq!(s.heap_index_of(node.account), slot);
        }
        assert_eq!(s.short_heap.peek().unwrap().account, AccountId(111));
    }

    #[test]
    fn commit_drops_the_journal() {
        let mut s = state();
        s.begin();
        s.credit(AccountId(5), Asset::Base, 1_000).unwrap();
        s.commit();
        s.rollback();
        assert_eq!(s.real_collateral_of(AccountId(5), Asset::Base).unwrap(), 1_000);
    }

    #[test]
    fn quote_limit_allows_repayment() {
        let mut s = state();
        s.params.quote_limit = 1_000;
        s.quote.balance = 900;
        assert!(s.check_quote_limit(Asset::Quote, 100, 0, Fp96::one()).is_ok());
        assert_eq!(
            s.check_quote_limit(Asset::Quote, 101, 0, Fp96::one()),
            Err(PoolError::ExceedsLimit)
        );
        assert!(s.check_quote_limit(Asset::Quote, 500, 500, Fp96::one()).is_ok());
        // base valued at price
        s.base.balance = 400;
        assert_eq!(
            s.check_quote_limit(Asset::Base, 200, 0, Fp96::from_int(2)),
            Err(PoolError::ExceedsLimit)
        );
    }

    #[test]
    fn remove_position_clears_aggregates() {
        let mut s = state();
        let (a, b) = (AccountId(5), AccountId(6));
        for acc in [a, b] {
            s.credit(acc, Asset::Quote, 1_000).unwrap();
            s.debit(acc, Asset::Base, 300).unwrap();
            s.sync_heap(acc);
        }
        s.remove_position(a).unwrap();
        assert_eq!(s.base.discounted_debt, 300);
        assert_eq!(s.quote.discounted_collateral, 1_000);
        assert_eq!(s.heap_index_of(b), 1);
        assert_eq!(s.short_heap.len(), 1);
        assert!(s.position(a).is_none());
    }
}
