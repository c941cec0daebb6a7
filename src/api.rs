// 10.0 api.rs: the single multiplexed entry point's wire shape.
// 10.1 ExecuteRequest is the flat form callers send; Call is the typed form the
// pool dispatches on. decoding rejects fields that make no sense for the kind.

use crate::engine::PoolError;
use crate::fp96::Fp96;
use crate::types::{AccountId, SwapParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    DepositBase,
    DepositQuote,
    WithdrawBase,
    WithdrawQuote,
    Short,
    Long,
    ClosePosition,
    Reinit,
    ReceivePosition,
    EmergencyWithdraw,
    SellCollateral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub kind: CallKind,
    pub amount1: u128,
    pub amount2: u128,
    // Quote per base, Q96. Worst price the caller accepts for any swap in the call
    pub price_limit: Fp96,
    pub unwrap: bool,
    // Deposits: account to book the deposit to. ReceivePosition: the account taken over
    pub position_owner: Option<AccountId>,
    pub swap_params: SwapParams,
}

impl ExecuteRequest {
    pub fn new(kind: CallKind) -> Self {
        Self {
            kind,
            amount1: 0,
            amount2: 0,
            price_limit: Fp96::zero(),
            unwrap: false,
            position_owner: None,
            swap_params: SwapParams::default(),
        }
    }

    pub fn amounts(mut self, amount1: u128, amount2: u128) -> Self {
        self.amount1 = amount1;
        self.amount2 = amount2;
        self
    }

    pub fn price_limit(mut self, limit: Fp96) -> Self {
        self.price_limit = limit;
        self
    }

    pub fn owner(mut self, owner: AccountId) -> Self {
        self.position_owner = Some(owner);
        self
    }
}

/// One pool operation with its typed payload. Amounts are real token units;
/// `amount` on Short/Long is always base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    DepositBase {
        amount: u128,
        long_amount: u128,
        limit_price: Fp96,
        owner: Option<AccountId>,
    },
    DepositQuote {
        amount: u128,
        short_amount: u128,
        limit_price: Fp96,
        owner: Option<AccountId>,
    },
    /// `u128::MAX` withdraws all collateral.
    WithdrawBase { amount: u128, unwrap: bool },
    WithdrawQuote { amount: u128, unwrap: bool },
    Short { amount: u128, limit_price: Fp96 },
    Long { amount: u128, limit_price: Fp96 },
    ClosePosition { limit_price: Fp96 },
    SellCollateral { amount: u128, limit_price: Fp96 },
    Reinit,
    ReceivePosition {
        bad_account: AccountId,
        quote_amount: u128,
        base_amount: u128,
    },
    EmergencyWithdraw { unwrap: bool },
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::DepositBase { .. } => CallKind::DepositBase,
            Call::DepositQuote { .. } => CallKind::DepositQuote,
            Call::WithdrawBase { .. } => CallKind::WithdrawBase,
            Call::WithdrawQuote { .. } => CallKind::WithdrawQuote,
            Call::Short { .. } => CallKind::Short,
            Call::Long { .. } => CallKind::Long,
            Call::ClosePosition { .. } => CallKind::ClosePosition,
            Call::SellCollateral { .. } => CallKind::SellCollateral,
            Call::Reinit => CallKind::Reinit,
            Call::ReceivePosition { .. } => CallKind::ReceivePosition,
            Call::EmergencyWithdraw { .. } => CallKind::EmergencyWithdraw,
        }
    }

    /// Whether the reserved fee account may make this call.
    pub fn allowed_for_fee_holder(&self) -> bool {
        matches!(
            self,
            Call::DepositBase { long_amount: 0, .. }
                | Call::DepositQuote { short_amount: 0, .. }
                | Call::WithdrawBase { .. }
                | Call::WithdrawQuote { .. }
                | Call::EmergencyWithdraw { .. }
        )
    }
}

impl TryFrom<&ExecuteRequest> for Call {
    type Error = PoolError;

    fn try_from(req: &ExecuteRequest) -> Result<Self, Self::Error> {
        let deposit = matches!(req.kind, CallKind::DepositBase | CallKind::DepositQuote);
        let receive = req.kind == CallKind::ReceivePosition;

        // owner redirection only for deposits that open nothing
        if req.position_owner.is_some() && !receive && !(deposit && req.amount2 == 0) {
            return Err(PoolError::Forbidden);
        }

        let uses_amount2 = deposit || receive;
        if req.amount2 != 0 && !uses_amount2 {
            return Err(PoolError::WrongValue("amount2 is not used by this call"));
        }

        let call = match req.kind {
            CallKind::DepositBase => Call::DepositBase {
                amount: req.amount1,
                long_amount: req.amount2,
                limit_price: req.price_limit,
                owner: req.position_owner,
            },
            CallKind::DepositQuote => Call::DepositQuote {
                amount: req.amount1,
                short_amount: req.amount2,
                limit_price: req.price_limit,
                owner: req.position_owner,
            },
            CallKind::WithdrawBase => Call::WithdrawBase {
                amount: req.amount1,
                unwrap: req.unwrap,
            },
            CallKind::WithdrawQuote => Call::WithdrawQuote {
                amount: req.amount1,
                unwrap: req.unwrap,
            },
            CallKind::Short => Call::Short {
                amount: req.amount1,
                limit_price: req.price_limit,
            },
            CallKind::Long => Call::Long {
                amount: req.amount1,
                limit_price: req.price_limit,
            },
            CallKind::ClosePosition => Call::ClosePosition {
                limit_price: req.price_limit,
            },
            CallKind::SellCollateral => Call::SellCollateral {
                amount: req.amount1,
                limit_price: req.price_limit,
            },
            CallKind::Reinit => Call::Reinit,
            CallKind::ReceivePosition => Call::ReceivePosition {
                bad_account: req
                    .position_owner
                    .ok_or(PoolError::WrongValue("position_owner names the account to receive"))?,
                quote_amount: req.amount1,
                base_amount: req.amount2,
            },
            CallKind::EmergencyWithdraw => Call::EmergencyWithdraw { unwrap: req.unwrap },
        };
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_deposit_with_leverage() {
        let req = ExecuteRequest::new(CallKind::DepositQuote)
            .amounts(1_000, 500)
            .price_limit(Fp96::one());
        let call = Call::try_from(&req).unwrap();
        assert_eq!(
            call,
            Call::DepositQuote {
                amount: 1_000,
                short_amount: 500,
                limit_price: Fp96::one(),
                owner: None,
            }
        );
        assert_eq!(call.kind(), CallKind::DepositQuote);
    }

    #[test]
    fn owner_only_for_pure_deposits() {
        let pure = ExecuteRequest::new(CallKind::DepositBase)
            .amounts(10, 0)
            .owner(AccountId(7));
        assert!(Call::try_from(&pure).is_ok());

        let leveraged = ExecuteRequest::new(CallKind::DepositBase)
            .amounts(10, 5)
            .owner(AccountId(7));
        assert!(matches!(Call::try_from(&leveraged), Err(PoolError::Forbidden)));

        let short = ExecuteRequest::new(CallKind::Short)
            .amounts(10, 0)
            .owner(AccountId(7));
        assert!(matches!(Call::try_from(&short), Err(PoolError::Forbidden)));
    }

    #[test]
    fn receive_needs_target() {
        let req = ExecuteRequest::new(CallKind::ReceivePosition).amounts(356, 7_700);
        assert!(matches!(Call::try_from(&req), Err(PoolError::WrongValue(_))));

        let req = req.owner(AccountId(3));
        assert_eq!(
            Call::try_from(&req).unwrap(),
            Call::ReceivePosition {
                bad_account: AccountId(3),
                quote_amount: 356,
                base_amount: 7_700,
            }
        );
    }

    #[test]
    fn stray_amount2_rejected() {
        let req = ExecuteRequest::new(CallKind::WithdrawBase).amounts(10, 1);
        assert!(matches!(Call::try_from(&req), Err(PoolError::WrongValue(_))));
    }

    #[test]
    fn fee_holder_calls() {
        let withdraw = Call::WithdrawQuote { amount: 1, unwrap: false };
        assert!(withdraw.allowed_for_fee_holder());
        assert!(!Call::Reinit.allowed_for_fee_holder());
        assert!(!Call::Short {
            amount: 1,
            limit_price: Fp96::zero()
        }
        .allowed_for_fee_holder());
    }
}
