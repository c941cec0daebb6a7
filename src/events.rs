// 11.0: every committed state change produces an event. used for audit trails and
// off-chain indexing. the EventPayload enum lists all event types; amounts are real units.

use crate::emergency::PoolMode;
use crate::fp96::Fp96;
use crate::position::PositionKind;
use crate::types::{AccountId, Asset, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Collateral movements
    DepositBase(TransferEvent),
    DepositQuote(TransferEvent),
    WithdrawBase(TransferEvent),
    WithdrawQuote(TransferEvent),

    // Leveraged trades
    Short(TradeEvent),
    Long(TradeEvent),
    ClosePosition(TradeEvent),
    SellCollateral(TradeEvent),

    // Risk events
    Reinit(ReinitEvent),
    MarginCall(MarginCallEvent),
    ReceivePosition(ReceivePositionEvent),
    Deleverage(DeleverageEvent),

    // Emergency
    EmergencyTripped(EmergencyTrippedEvent),
    EmergencyWithdraw(EmergencyWithdrawEvent),

    // Admin
    ParametersChanged(ParametersChangedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub account: AccountId,
    /// The account the moved amount was booked to (differs on redirected deposits).
    pub position_owner: AccountId,
    pub amount: u128,
    pub discounted_amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub account: AccountId,
    /// Base amount bought or sold.
    pub base_amount: u128,
    /// Quote amount paid or received, before fee.
    pub quote_amount: u128,
    pub fee: u128,
    pub kind_before: PositionKind,
    pub kind_after: PositionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinitEvent {
    pub elapsed_seconds: u64,
    pub short_leverage: Fp96,
    pub long_leverage: Fp96,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginCallEvent {
    pub account: AccountId,
    pub kind: PositionKind,
    pub collateral_seized: u128,
    pub debt_closed: u128,
    /// Debt proceeds above the closed debt, credited to lenders.
    pub surplus: u128,
    /// Debt the collateral could not cover.
    pub shortfall: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivePositionEvent {
    pub liquidator: AccountId,
    pub liquidated: AccountId,
    pub kind_after: PositionKind,
    pub quote_amount: u128,
    pub base_amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleverageEvent {
    /// Asset the liquidation came up short on.
    pub asset: Asset,
    pub shortfall: u128,
    pub absorbed_by: LossAbsorber,
    /// Other-asset collateral of the liquidated position written off the
    /// netted borrowers' debt.
    pub debt_relieved: u128,
    pub delev_coeff: Fp96,
}

/// Who took an unrecovered liquidation shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossAbsorber {
    /// Borrowers of the other asset: collateral cut, debt written down.
    Counterparties,
    /// Remaining borrowers of the same asset: debt raised pro rata.
    SameSide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyTrippedEvent {
    pub mode: PoolMode,
    pub base_balance: u128,
    pub quote_balance: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyWithdrawEvent {
    pub account: AccountId,
    pub base_amount: u128,
    pub quote_amount: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersChangedEvent {
    pub by: AccountId,
    pub max_leverage: u32,
}

/// Buffers events of one call; flushed into the pool only when the call commits.
#[derive(Debug, Default)]
pub struct EventCollector {
    payloads: Vec<EventPayload>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            payloads: Vec::new(),
        }
    }

    pub fn push(&mut self, payload: EventPayload) {
        self.payloads.push(payload);
    }

    pub fn payloads(&self) -> &[EventPayload] {
        &self.payloads
    }

    pub fn drain(&mut self) -> Vec<EventPayload> {
        std::mem::take(&mut self.payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_collector() {
        let mut collector = EventCollector::new();
        collector.push(EventPayload::DepositBase(TransferEvent {
            account: AccountId(1),
            position_owner: AccountId(1),
            amount: 10_000,
            discounted_amount: 10_000,
        }));
        assert_eq!(collector.payloads().len(), 1);

        let drained = collector.drain();
        assert_eq!(drained.len(), 1);
        assert!(collector.payloads().is_empty());
    }

    #[test]
    fn event_serializes() {
        let event = Event::new(
            EventId(3),
            Timestamp::from_secs(100),
            EventPayload::MarginCall(MarginCallEvent {
                account: AccountId(9),
                kind: PositionKind::Short,
                collateral_seized: 100,
                debt_closed: 7_500,
                surplus: 0,
                shortfall: 12,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("MarginCall"));
    }
}
