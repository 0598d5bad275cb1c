//! capgate-execution
//!
//! Wires the evaluator to a broker: the stream runner evaluates each
//! intent, writes the audit record before touching the broker, submits
//! routable decisions, applies fills, and evolves execution state
//! (rate counters, the rolling violation window, the kill switch).

pub mod broker;
pub mod events;
pub mod runner;

pub use broker::{Broker, Fill};
pub use events::{write_execution_event, ExecutionEvent};
pub use runner::{apply_fill, evict_window, order_type_str, run_stream, RunSummary, RunSummaryReport};
