// 8.0 engine/core.rs: the pool aggregate. owns both asset ledgers, both heaps,
// every position and the venue. every call journals what it touches and is
// rolled back from the journal on error.

use super::config::EngineConfig;
use super::results::{ExecuteOutcome, PoolError, SystemLeverage};
use crate::api::{Call, ExecuteRequest};
use crate::config::PoolParams;
use crate::emergency::{EmergencySnapshot, PoolMode};
use crate::events::{Event, EventCollector, EventId, EventPayload, ParametersChangedEvent};
use crate::fp96::Fp96;
use crate::heap::LeverageHeap;
use crate::position::{Position, PositionKind};
use crate::types::{AccountId, Asset, SwapParams, Timestamp};
use crate::venue::{PriceOracle, SwapError, SwapFill, SwapRequest, SwapRouter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/** 8.1: coefficients, aggregates and token balance of one asset */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    pub collateral_coeff: Fp96,
    pub debt_coeff: Fp96,
    /// Deleverage cut on this asset's collateral, per discounted unit of the
    /// other asset owed by the same position.
    pub delev_coeff: Fp96,
    /// Part of `debt_coeff` written off by deleverage. Compounds with it.
    pub debt_relief: Fp96,
    pub discounted_collateral: u128,
    pub discounted_debt: u128,
    /// Tokens the pool holds.
    pub balance: u128,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self {
            collateral_coeff: Fp96::one(),
            debt_coeff: Fp96::one(),
            delev_coeff: Fp96::zero(),
            debt_relief: Fp96::zero(),
            discounted_collateral: 0,
            discounted_debt: 0,
            balance: 0,
        }
    }
}

impl Default for AssetLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// What a call needs to undo itself: the small fields whole, and each
/// position as it was before the call first touched it.
#[derive(Debug, Clone)]
pub(super) struct StateUndo {
    params: PoolParams,
    base: AssetLedger,
    quote: AssetLedger,
    system_leverage: SystemLeverage,
    last_accrual: Timestamp,
    mode: PoolMode,
    emergency: Option<EmergencySnapshot>,
    pub(super) positions: HashMap<AccountId, Option<Position>>,
}

/** 8.2: everything a call may change */
#[derive(Debug, Clone)]
pub struct PoolState {
    pub(super) params: PoolParams,
    pub(super) base: AssetLedger,
    pub(super) quote: AssetLedger,
    pub(super) short_heap: LeverageHeap,
    pub(super) long_heap: LeverageHeap,
    pub(super) positions: HashMap<AccountId, Position>,
    pub(super) system_leverage: SystemLeverage,
    pub(super) last_accrual: Timestamp,
    pub(super) mode: PoolMode,
    pub(super) emergency: Option<EmergencySnapshot>,
    pub(super) undo: Option<StateUndo>,
}

// the journal is bookkeeping, not state
impl PartialEq for PoolState {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.base == other.base
            && self.quote == other.quote
            && self.short_heap == other.short_heap
            && self.long_heap == other.long_heap
            && self.positions == other.positions
            && self.system_leverage == other.system_leverage
            && self.last_accrual == other.last_accrual
            && self.mode == other.mode
            && self.emergency == other.emergency
    }
}

impl PoolState {
    pub(super) fn new(params: PoolParams, start: Timestamp) -> Self {
        Self {
            params,
            base: AssetLedger::new(),
            quote: AssetLedger::new(),
            short_heap: LeverageHeap::new(),
            long_heap: LeverageHeap::new(),
            positions: HashMap::new(),
            system_leverage: SystemLeverage::default(),
            last_accrual: start,
            mode: PoolMode::Regular,
            emergency: None,
            undo: None,
        }
    }

    /// Starts journaling a call.
    pub(super) fn begin(&mut self) {
        self.undo = Some(StateUndo {
            params: self.params.clone(),
            base: self.base.clone(),
            quote: self.quote.clone(),
            system_leverage: self.system_leverage,
            last_accrual: self.last_accrual,
            mode: self.mode,
            emergency: self.emergency.clone(),
            positions: HashMap::new(),
        });
        self.short_heap.begin();
        self.long_heap.begin();
    }

    pub(super) fn commit(&mut self) {
        self.undo = None;
        self.short_heap.commit();
        self.long_heap.commit();
    }

    /// Puts back everything changed since `begin`.
    pub(super) fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        self.params = undo.params;
        self.base = undo.base;
        self.quote = undo.quote;
        self.system_leverage = undo.system_leverage;
        self.last_accrual = undo.last_accrual;
        self.mode = undo.mode;
        self.emergency = undo.emergency;
        for (account, prior) in undo.positions {
            match prior {
                Some(position) => {
                    self.positions.insert(account, position);
                }
                None => {
                    self.positions.remove(&account);
                }
            }
        }
        self.short_heap.rollback();
        self.long_heap.rollback();
    }

    /// Journals `account`'s position before it is changed.
    pub(super) fn touch(&mut self, account: AccountId) {
        if let Some(undo) = self.undo.as_mut() {
            undo.positions
                .entry(account)
                .or_insert_with(|| self.positions.get(&account).cloned());
        }
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn ledger(&self, asset: Asset) -> &AssetLedger {
        match asset {
            Asset::Base => &self.base,
            Asset::Quote => &self.quote,
        }
    }

    pub(super) fn ledger_mut(&mut self, asset: Asset) -> &mut AssetLedger {
        match asset {
            Asset::Base => &mut self.base,
            Asset::Quote => &mut self.quote,
        }
    }

    /// Shorts borrow base and sit in the short heap; longs borrow quote.
    pub fn heap_for_debt(&self, debt_asset: Asset) -> &LeverageHeap {
        match debt_asset {
            Asset::Base => &self.short_heap,
            Asset::Quote => &self.long_heap,
        }
    }

    pub fn short_heap(&self) -> &LeverageHeap {
        &self.short_heap
    }

    pub fn long_heap(&self) -> &LeverageHeap {
        &self.long_heap
    }

    pub fn position(&self, account: AccountId) -> Option<&Position> {
        self.positions.get(&account)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&AccountId, &Position)> {
        self.positions.iter()
    }

    pub fn position_kind(&self, account: AccountId) -> PositionKind {
        self.positions
            .get(&account)
            .map(Position::kind)
            .unwrap_or(PositionKind::Uninitialized)
    }

    pub fn heap_index_of(&self, account: AccountId) -> u32 {
        self.positions.get(&account).map(|p| p.heap_index).unwrap_or(0)
    }

    /// Leverage as last stored, capped at `max_leverage`. This is the
    /// multiplier interest accrues at; see `system_leverage_uncapped` for the
    /// actual figure.
    pub fn system_leverage(&self) -> SystemLeverage {
        self.system_leverage
    }

    pub fn last_accrual(&self) -> Timestamp {
        self.last_accrual
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    pub fn emergency_snapshot(&self) -> Option<&EmergencySnapshot> {
        self.emergency.as_ref()
    }
}

/// Per-call values fixed when the call starts.
#[derive(Debug, Clone, Copy)]
pub(super) struct CallContext {
    pub caller: AccountId,
    /// Oracle price, quote per base.
    pub price: Fp96,
    pub route: SwapParams,
    pub now: Timestamp,
}

/** 8.3: the pool. all state lives here */
#[derive(Debug)]
pub struct MarginPool<V> {
    pub(super) config: EngineConfig,
    pub(super) state: PoolState,
    pub(super) venue: V,
    pub(super) pending: EventCollector,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl<V: PriceOracle + SwapRouter> MarginPool<V> {
    pub fn new(
        config: EngineConfig,
        params: PoolParams,
        venue: V,
        start: Timestamp,
    ) -> Result<Self, PoolError> {
        params.validate()?;
        Ok(Self {
            config,
            state: PoolState::new(params, start),
            venue,
            pending: EventCollector::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: start,
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn params(&self) -> &PoolParams {
        &self.state.params
    }

    pub fn position(&self, account: AccountId) -> Option<&Position> {
        self.state.position(account)
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn admin(&self) -> AccountId {
        self.config.admin
    }

    /// Decodes a flat request and runs it.
    pub fn execute(
        &mut self,
        caller: AccountId,
        request: &ExecuteRequest,
    ) -> Result<ExecuteOutcome, PoolError> {
        let call = Call::try_from(request)?;
        self.execute_routed(caller, call, request.swap_params)
    }

    pub fn execute_call(&mut self, caller: AccountId, call: Call) -> Result<ExecuteOutcome, PoolError> {
        self.execute_routed(caller, call, SwapParams::default())
    }

    fn execute_routed(
        &mut self,
        caller: AccountId,
        call: Call,
        route: SwapParams,
    ) -> Result<ExecuteOutcome, PoolError> {
        let kind = call.kind();
        let result = self.atomically(|pool| pool.dispatch(caller, call, route));
        match &result {
            Ok(outcome) => debug!(
                account = %caller,
                ?kind,
                base = outcome.base_amount,
                quote = outcome.quote_amount,
                heap_index = outcome.heap_index,
                margin_called = outcome.margin_called,
                "call committed"
            ),
            Err(err) => debug!(account = %caller, ?kind, %err, "call reverted"),
        }
        result
    }

    /// Runs `f`; on error the state is rolled back from the journal and
    /// buffered events are discarded. Not re-entrant.
    pub(super) fn atomically<T, F>(&mut self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(&mut Self) -> Result<T, PoolError>,
    {
        self.state.begin();
        match f(self) {
            Ok(value) => {
                self.state.commit();
                for payload in self.pending.drain() {
                    self.emit_event(payload);
                }
                Ok(value)
            }
            Err(err) => {
                self.state.rollback();
                self.pending.drain();
                Err(err)
            }
        }
    }

    fn dispatch(
        &mut self,
        caller: AccountId,
        call: Call,
        route: SwapParams,
    ) -> Result<ExecuteOutcome, PoolError> {
        if caller.is_fee_holder() && !call.allowed_for_fee_holder() {
            return Err(PoolError::Forbidden);
        }
        if self.state.mode.is_emergency() {
            return match call {
                Call::EmergencyWithdraw { unwrap } => self.emergency_withdraw(caller, unwrap),
                _ => Err(PoolError::EmergencyMode),
            };
        }

        let ctx = CallContext {
            caller,
            price: self.venue.base_price()?,
            route,
            now: self.current_time,
        };

        let margin_called = self.reinit(&ctx)?;
        if margin_called || self.state.mode.is_emergency() {
            return Ok(ExecuteOutcome {
                margin_called,
                ..ExecuteOutcome::default()
            });
        }

        match call {
            Call::DepositBase {
                amount,
                long_amount,
                limit_price,
                owner,
            } => self.deposit(&ctx, Asset::Base, amount, long_amount, limit_price, owner),
            Call::DepositQuote {
                amount,
                short_amount,
                limit_price,
                owner,
            } => self.deposit(&ctx, Asset::Quote, amount, short_amount, limit_price, owner),
            Call::WithdrawBase { amount, unwrap } => self.withdraw(&ctx, Asset::Base, amount, unwrap),
            Call::WithdrawQuote { amount, unwrap } => self.withdraw(&ctx, Asset::Quote, amount, unwrap),
            Call::Short { amount, limit_price } => self.short(&ctx, caller, amount, limit_price),
            Call::Long { amount, limit_price } => self.long(&ctx, caller, amount, limit_price),
            Call::ClosePosition { limit_price } => self.close_position(&ctx, limit_price),
            Call::SellCollateral { amount, limit_price } => {
                self.sell_collateral(&ctx, amount, limit_price)
            }
            Call::Reinit => Ok(ExecuteOutcome {
                heap_index: self.state.heap_index_of(caller),
                ..ExecuteOutcome::default()
            }),
            Call::ReceivePosition {
                bad_account,
                quote_amount,
                base_amount,
            } => self.receive_position(&ctx, bad_account, quote_amount, base_amount),
            Call::EmergencyWithdraw { .. } => Err(PoolError::NotEmergency),
        }
    }

    /// Admin-only. Interest up to now accrues at the old parameters.
    pub fn set_parameters(&mut self, caller: AccountId, params: PoolParams) -> Result<(), PoolError> {
        if caller != self.config.admin {
            return Err(PoolError::AccessDenied(caller));
        }
        params.validate()?;

        self.atomically(|pool| {
            if !pool.state.mode.is_emergency() {
                let price = pool.venue.base_price()?;
                pool.accrue(pool.current_time, price)?;
            }
            let max_leverage = params.max_leverage;
            pool.state.params = params;
            pool.record(EventPayload::ParametersChanged(ParametersChangedEvent {
                by: caller,
                max_leverage,
            }));
            Ok(())
        })
    }

    /// Position leverage at the current oracle price.
    pub fn position_leverage(&self, account: AccountId) -> Result<Fp96, PoolError> {
        let position = self
            .state
            .position(account)
            .ok_or(PoolError::UninitializedPosition(account))?;
        let price = self.venue.base_price()?;
        self.state.position_leverage(position, price)
    }

    /// Actual leverage of the side borrowing `debt_asset` at the current
    /// oracle price. Unlike the stored value it can exceed `max_leverage`.
    pub fn system_leverage_uncapped(&self, debt_asset: Asset) -> Result<Fp96, PoolError> {
        let price = self.venue.base_price()?;
        self.state.system_leverage_uncapped(debt_asset, price)
    }

    /// Real collateral (positive) or debt of `account` on `asset`.
    pub fn real_amount(&self, account: AccountId, asset: Asset) -> Result<u128, PoolError> {
        let Some(position) = self.state.position(account) else {
            return Ok(0);
        };
        if position.holding(asset).is_debt() {
            self.state.debt_in(position, asset)
        } else {
            self.state.collateral_in(position, asset)
        }
    }

    /// Venue call with limit failures mapped to `SlippageLimit`. Balances are
    /// settled separately by the caller through `PoolState::apply_fill`.
    pub(super) fn swap(&mut self, request: &SwapRequest) -> Result<SwapFill, PoolError> {
        let fill = self.venue.swap(request).map_err(|err| match err {
            SwapError::InsufficientOutput { .. } | SwapError::ExcessiveInput { .. } => {
                PoolError::SlippageLimit
            }
            other => PoolError::Swap(other),
        })?;
        if !request.is_honoured_by(&fill) {
            return Err(PoolError::SlippageLimit);
        }
        Ok(fill)
    }

    pub(super) fn record(&mut self, payload: EventPayload) {
        self.pending.push(payload);
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
