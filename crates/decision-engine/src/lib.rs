pub mod engine;
pub mod guard;
pub mod params;
pub mod store;
pub mod weights;

pub use engine::{DecisionEngine, DecisionInputs};
pub use guard::{GuardBlock, OvertradingGuard};
pub use params::{plan_trade, PlanInputs};
pub use store::InMemoryOvertradingStore;
pub use weights::{weighted_score, VoteInputs};
