//! Property-based tests for pool accounting.
//!
//! Random sequences of deposits, trades, withdrawals, price moves and time
//! jumps; the ledger invariants must hold after every step whether or not
//! the step succeeded.

use marginpool_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const TRADERS: [AccountId; 4] = [AccountId(20), AccountId(21), AccountId(22), AccountId(23)];

#[derive(Debug, Clone)]
enum Step {
    Deposit { who: usize, base: bool, amount: u128, leverage: u128 },
    Withdraw { who: usize, base: bool, amount: u128 },
    Short { who: usize, amount: u128 },
    Long { who: usize, amount: u128 },
    Close { who: usize },
    Reinit,
    Advance { secs: u64 },
    Price { bps: i64 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let who = 0usize..TRADERS.len();
    prop_oneof![
        (who.clone(), any::<bool>(), 1u128..5_000, 0u128..8_000).prop_map(
            |(who, base, amount, leverage)| Step::Deposit { who, base, amount, leverage }
        ),
        (who.clone(), any::<bool>(), 1u128..5_000)
            .prop_map(|(who, base, amount)| Step::Withdraw { who, base, amount }),
        (who.clone(), 1u128..5_000).prop_map(|(who, amount)| Step::Short { who, amount }),
        (who.clone(), 1u128..5_000).prop_map(|(who, amount)| Step::Long { who, amount }),
        who.prop_map(|who| Step::Close { who }),
        Just(Step::Reinit),
        (1u64..30 * SECONDS_IN_DAY).prop_map(|secs| Step::Advance { secs }),
        (8_000i64..12_000i64).prop_map(|bps| Step::Price { bps }), // 0.8 to 1.2
    ]
}

fn seeded_pool() -> MarginPool<SimulatedVenue> {
    let venue = SimulatedVenue::new(dec!(1)).unwrap();
    let mut pool = MarginPool::new(
        EngineConfig::default(),
        PoolParams::default(),
        venue,
        Timestamp::from_secs(1_700_000_000),
    )
    .unwrap();
    for (who, kind) in [
        (AccountId(10), CallKind::DepositBase),
        (AccountId(11), CallKind::DepositQuote),
    ] {
        pool.execute(who, &ExecuteRequest::new(kind).amounts(50_000, 0))
            .unwrap();
    }
    pool
}

fn wide_limit() -> Fp96 {
    Fp96::from_int(10)
}

fn apply(pool: &mut MarginPool<SimulatedVenue>, step: &Step) -> Result<ExecuteOutcome, PoolError> {
    match *step {
        Step::Deposit { who, base, amount, leverage } => {
            let call = if base {
                Call::DepositBase {
                    amount,
                    long_amount: leverage,
                    limit_price: wide_limit(),
                    owner: None,
                }
            } else {
                Call::DepositQuote {
                    amount,
                    short_amount: leverage,
                    limit_price: Fp96::zero(),
                    owner: None,
                }
            };
            pool.execute_call(TRADERS[who], call)
        }
        Step::Withdraw { who, base, amount } => {
            let call = if base {
                Call::WithdrawBase { amount, unwrap: false }
            } else {
                Call::WithdrawQuote { amount, unwrap: false }
            };
            pool.execute_call(TRADERS[who], call)
        }
        Step::Short { who, amount } => pool.execute_call(
            TRADERS[who],
            Call::Short {
                amount,
                limit_price: Fp96::zero(),
            },
        ),
        Step::Long { who, amount } => pool.execute_call(
            TRADERS[who],
            Call::Long {
                amount,
                limit_price: wide_limit(),
            },
        ),
        Step::Close { who } => pool.execute_call(
            TRADERS[who],
            Call::ClosePosition {
                limit_price: wide_limit(),
            },
        ),
        Step::Reinit => pool.execute_call(AccountId(99), Call::Reinit),
        Step::Advance { secs } => {
            pool.advance_time(secs);
            Ok(ExecuteOutcome::default())
        }
        Step::Price { bps } => {
            pool.venue_mut().set_price(Decimal::new(bps, 4)).unwrap();
            Ok(ExecuteOutcome::default())
        }
    }
}

/// Aggregates match the positions, heaps match position kinds, nobody owes both assets.
fn check_ledger(state: &PoolState) -> Result<(), TestCaseError> {
    for asset in [Asset::Base, Asset::Quote] {
        let mut collateral = 0u128;
        let mut debt = 0u128;
        for (_, position) in state.positions() {
            let holding = position.holding(asset);
            collateral += holding.collateral();
            debt += holding.debt();
        }
        let ledger = state.ledger(asset);
        prop_assert_eq!(ledger.discounted_collateral, collateral);
        prop_assert_eq!(ledger.discounted_debt, debt);
    }

    for (account, position) in state.positions() {
        prop_assert!(!(position.base.is_debt() && position.quote.is_debt()));
        let heap = match position.kind() {
            PositionKind::Short => Some(state.short_heap()),
            PositionKind::Long => Some(state.long_heap()),
            _ => None,
        };
        match heap {
            Some(heap) => {
                let node = heap.get(position.heap_index);
                prop_assert_eq!(node.map(|n| n.account), Some(*account));
            }
            None => prop_assert_eq!(position.heap_index, 0),
        }
    }

    for (slot, node) in state.short_heap().iter() {
        let position = state.position(node.account);
        prop_assert_eq!(position.map(|p| p.heap_index), Some(slot));
        prop_assert_eq!(state.position_kind(node.account), PositionKind::Short);
    }
    for (slot, node) in state.long_heap().iter() {
        let position = state.position(node.account);
        prop_assert_eq!(position.map(|p| p.heap_index), Some(slot));
        prop_assert_eq!(state.position_kind(node.account), PositionKind::Long);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every committed or rejected step leaves consistent books
    #[test]
    fn ledger_stays_consistent(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut pool = seeded_pool();
        for step in &steps {
            let _ = apply(&mut pool, step);
            check_ledger(pool.state())?;
        }
    }

    /// A rejected call changes nothing
    #[test]
    fn errors_roll_back(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut pool = seeded_pool();
        for step in &steps {
            let before = pool.state().clone();
            let events = pool.events().len();
            if apply(&mut pool, step).is_err() {
                prop_assert_eq!(pool.state(), &before);
                prop_assert_eq!(pool.events().len(), events);
            }
        }
    }

    /// Interest only ever grows the indices, losses only grow the charges
    #[test]
    fn coefficients_monotone(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut pool = seeded_pool();
        for step in &steps {
            let before = pool.state().clone();
            let _ = apply(&mut pool, step);
            for asset in [Asset::Base, Asset::Quote] {
                let (old, new) = (before.ledger(asset), pool.state().ledger(asset));
                prop_assert!(new.collateral_coeff >= old.collateral_coeff);
                prop_assert!(new.debt_coeff >= old.debt_coeff);
                prop_assert!(new.delev_coeff >= old.delev_coeff);
                prop_assert!(new.debt_relief >= old.debt_relief);
            }
        }
    }

    /// After any committed call in regular mode, neither side's actual
    /// leverage is over the maximum
    #[test]
    fn system_leverage_within_bound(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut pool = seeded_pool();
        let max = pool.params().max_leverage_x96();
        for step in &steps {
            if matches!(step, Step::Advance { .. } | Step::Price { .. }) {
                let _ = apply(&mut pool, step);
                continue;
            }
            // every call then runs the liquidation pass
            pool.advance_time(1);
            if apply(&mut pool, step).is_err() || pool.state().mode() != PoolMode::Regular {
                continue;
            }
            let price = pool.venue().price();
            for asset in [Asset::Base, Asset::Quote] {
                let leverage = pool.state().system_leverage_uncapped(asset, price).unwrap();
                prop_assert!(leverage <= max, "{:?} side at {}", asset, leverage);
            }
        }
    }

    /// Positions left in the heaps after a reinit are within the leverage bound
    #[test]
    fn reinit_leaves_no_bad_roots(
        steps in prop::collection::vec(step_strategy(), 1..40),
        secs in 1u64..SECONDS_IN_DAY,
    ) {
        let mut pool = seeded_pool();
        for step in &steps {
            let _ = apply(&mut pool, step);
        }
        pool.advance_time(secs);
        if pool.execute_call(AccountId(99), Call::Reinit).is_ok()
            && pool.state().mode() == PoolMode::Regular
        {
            let price = pool.venue().price();
            for heap in [pool.state().short_heap(), pool.state().long_heap()] {
                if let Some(root) = heap.peek() {
                    let position = pool.state().position(root.account).unwrap();
                    prop_assert!(!pool.state().is_liquidatable(position, price).unwrap());
                }
            }
        }
    }
}
