//! Margin pool simulation.
//!
//! Walks the pool through its lifecycle: lending, leveraged shorts and longs,
//! interest accrual, a position flip, an auto-liquidation and an emergency
//! shutdown. Set RUST_LOG=debug to see the engine's own trace.

use marginpool_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const ADMIN: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(10);
const BOB: AccountId = AccountId(11);
const CAROL: AccountId = AccountId(20);
const DAVE: AccountId = AccountId(21);
const KEEPER: AccountId = AccountId(99);

type Pool = MarginPool<SimulatedVenue>;
type SimResult = Result<(), PoolError>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Margin Pool Simulation");
    println!("Two assets, leverage heaps, auto-liquidation\n");

    let scenarios: [(&str, fn() -> SimResult); 5] = [
        ("lending and interest", scenario_1_lending_and_interest),
        ("short to long flip", scenario_2_flip),
        ("auto-liquidation", scenario_3_auto_liquidation),
        ("liquidation takeover", scenario_4_takeover),
        ("emergency shutdown", scenario_5_emergency),
    ];
    for (name, run) in scenarios {
        if let Err(err) = run() {
            eprintln!("  scenario '{name}' failed: {err}");
            std::process::exit(1);
        }
    }

    println!("\nAll simulations completed successfully.");
}

fn new_pool(params: PoolParams, price: Decimal) -> Result<Pool, PoolError> {
    let venue = SimulatedVenue::new(price)?;
    MarginPool::new(EngineConfig::with_admin(ADMIN), params, venue, Timestamp::now())
}

fn lend(pool: &mut Pool, who: AccountId, base: u128, quote: u128) -> SimResult {
    if base > 0 {
        pool.execute(who, &ExecuteRequest::new(CallKind::DepositBase).amounts(base, 0))?;
    }
    if quote > 0 {
        pool.execute(who, &ExecuteRequest::new(CallKind::DepositQuote).amounts(quote, 0))?;
    }
    Ok(())
}

fn show_position(pool: &Pool, who: AccountId, label: &str) -> SimResult {
    let kind = pool.state().position_kind(who);
    let base = pool.real_amount(who, Asset::Base)?;
    let quote = pool.real_amount(who, Asset::Quote)?;
    let leverage = match kind {
        PositionKind::Uninitialized => Decimal::ZERO,
        _ => pool.position_leverage(who)?.to_decimal().round_dp(2),
    };
    println!("  {label}: {kind}, base {base}, quote {quote}, leverage {leverage}x");
    Ok(())
}

/// Lenders supply both assets, a trader shorts, a month of interest accrues.
fn scenario_1_lending_and_interest() -> SimResult {
    println!("Scenario 1: Lending and Interest\n");

    let mut pool = new_pool(PoolParams::default(), dec!(1))?;
    lend(&mut pool, ALICE, 10_000, 0)?;
    lend(&mut pool, BOB, 0, 10_000)?;
    println!("  Alice lends 10,000 base, Bob lends 10,000 quote");

    let outcome = pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(1_000, 5_000),
    )?;
    println!(
        "  Carol deposits 1,000 quote and shorts 5,000 base for {} quote (heap slot {})",
        outcome.quote_amount, outcome.heap_index
    );
    show_position(&pool, CAROL, "Carol")?;

    pool.advance_time(30 * SECONDS_IN_DAY);
    pool.execute_call(KEEPER, Call::Reinit)?;
    println!("\n  30 days later");
    show_position(&pool, ALICE, "Alice")?;
    show_position(&pool, CAROL, "Carol")?;
    println!(
        "  Fee holder earned {} base\n",
        pool.real_amount(AccountId::FEE_HOLDER, Asset::Base)?
    );
    Ok(())
}

/// A short buys back more than it owes and ends up long.
fn scenario_2_flip() -> SimResult {
    println!("Scenario 2: Short to Long Flip\n");

    let mut pool = new_pool(PoolParams::default(), dec!(1))?;
    lend(&mut pool, ALICE, 10_000, 0)?;
    lend(&mut pool, BOB, 0, 10_000)?;

    pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(1_000, 2_000),
    )?;
    show_position(&pool, CAROL, "Carol after short")?;

    pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::Long)
            .amounts(3_000, 0)
            .price_limit(Fp96::from_int(2)),
    )?;
    show_position(&pool, CAROL, "Carol after long")?;
    println!(
        "  Short heap {}, long heap {}\n",
        pool.state().short_heap().len(),
        pool.state().long_heap().len()
    );
    Ok(())
}

/// A price jump pushes the most leveraged short over the bound.
fn scenario_3_auto_liquidation() -> SimResult {
    println!("Scenario 3: Auto-liquidation\n");

    let mut pool = new_pool(PoolParams::testnet(), dec!(1))?;
    lend(&mut pool, ALICE, 10_000, 10_000)?;
    lend(&mut pool, BOB, 10_000, 10_000)?;
    pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(500, 7_500),
    )?;
    pool.execute(
        DAVE,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(1_000, 7_400),
    )?;
    show_position(&pool, CAROL, "Carol")?;
    show_position(&pool, DAVE, "Dave")?;

    pool.venue_mut().set_price(dec!(1.03))?;
    pool.advance_time(20 * SECONDS_IN_DAY);
    println!("\n  Price moves to 1.03, 20 days pass, keeper calls reinit");
    pool.execute_call(KEEPER, Call::Reinit)?;

    for event in pool.events() {
        if let EventPayload::MarginCall(call) = &event.payload {
            println!(
                "  Margin call on {}: seized {}, debt {}, surplus {}, shortfall {}",
                call.account, call.collateral_seized, call.debt_closed, call.surplus, call.shortfall
            );
        }
    }
    show_position(&pool, CAROL, "Carol")?;
    show_position(&pool, DAVE, "Dave")?;
    println!();
    Ok(())
}

/// A liquidator repays a bad short's debt and keeps what is left of it.
fn scenario_4_takeover() -> SimResult {
    println!("Scenario 4: Liquidation Takeover\n");

    let mut pool = new_pool(PoolParams::testnet(), dec!(1))?;
    lend(&mut pool, ALICE, 10_000, 0)?;
    lend(&mut pool, BOB, 0, 10_000)?;
    pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(500, 7_500),
    )?;

    pool.advance_time(20 * SECONDS_IN_DAY);
    pool.execute_call(KEEPER, Call::Reinit)?;
    pool.venue_mut().set_price(dec!(1.03))?;
    show_position(&pool, CAROL, "Carol at 1.03")?;

    pool.execute(
        DAVE,
        &ExecuteRequest::new(CallKind::ReceivePosition)
            .amounts(356, 7_700)
            .owner(CAROL),
    )?;
    println!("  Dave receives Carol's position with 356 quote and 7,700 base");
    show_position(&pool, DAVE, "Dave")?;
    println!();
    Ok(())
}

/// The only base lender's base is all lent out and the short side goes under.
fn scenario_5_emergency() -> SimResult {
    println!("Scenario 5: Emergency Shutdown\n");

    let mut pool = new_pool(PoolParams::testnet(), dec!(1))?;
    lend(&mut pool, ALICE, 1_000, 0)?;
    pool.execute(
        CAROL,
        &ExecuteRequest::new(CallKind::DepositQuote).amounts(100, 1_000),
    )?;

    pool.venue_mut().set_price(dec!(1.5))?;
    let mode = pool.shut_down(KEEPER)?;
    println!("  Price moves to 1.5, pool enters {mode}");

    for who in [ALICE, CAROL] {
        let paid = pool.execute_call(who, Call::EmergencyWithdraw { unwrap: false })?;
        println!(
            "  {who} withdraws {} base and {} quote",
            paid.base_amount, paid.quote_amount
        );
    }
    Ok(())
}
