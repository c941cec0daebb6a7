// marginpool-core: accounting and risk core of a two-asset leveraged lending pool.
// risk-first: every call accrues interest and liquidates before it does anything else.
// all computation is deterministic; the swap venue and price feed are traits.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Asset, Timestamp, SwapParams
//   2.x  fp96.rs: Q96 fixed point, mul_div, Taylor compounding
//   3.x  heap.rs: max-heap of leveraged positions by debt/collateral rank
//   4.x  position.rs: position record, holdings, derived kind
//   6.x  emergency.rs: pool modes, frozen snapshot, pro-rata shares
//   7.x  config.rs: pool parameters, validation, env presets
//   8.x  engine/: the pool: ledger, accrual, deposits, trades, liquidations, emergency
//   9.x  venue.rs: price oracle and swap router traits, simulated venue (mocked)
//   10.x api.rs: flat execute request and typed calls
//   11.x events.rs: state transition events for audit

pub mod api;
pub mod config;
pub mod emergency;
pub mod engine;
pub mod events;
pub mod fp96;
pub mod heap;
pub mod position;
pub mod types;
pub mod venue;

// re exports for convenience
pub use api::{Call, CallKind, ExecuteRequest};
pub use config::{ConfigError, Environment, PoolParams};
pub use emergency::{EmergencySnapshot, PoolMode};
pub use engine::*;
pub use events::*;
pub use fp96::{Fp96, MathError};
pub use heap::{HeapNode, LeverageHeap};
pub use position::*;
pub use types::*;
pub use venue::{OracleError, PriceOracle, SimulatedVenue, SwapError, SwapFill, SwapRequest, SwapRouter};
