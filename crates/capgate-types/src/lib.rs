pub mod decision;
pub mod instrument;
pub mod intent;
pub mod policy;
pub mod state;

pub use decision::{round6, Decision, Evidence, Severity, Verdict, Violation};
pub use instrument::{AssetClass, Instrument, OrderType, Side};
pub use intent::OrderIntent;
pub use policy::{
    CapitalPolicy, Defaults, DecisionDefault, ExecutionLimits, ExposureLimits, KillSwitchConfig,
    Limits, LossLimits, Mode, Overrides, StrategyOverride, SymbolOverride,
};
pub use state::{ExecutionState, MarketSnapshot, PortfolioState};
