//! Run plumbing: event bus, lifecycle controller, supervisor, and the
//! session-update aggregator.

pub mod aggregator;
pub mod bus;
pub mod controller;
pub mod supervisor;

pub use aggregator::ToolCallAggregator;
pub use bus::{EventBus, EventHook, EventSink, EventStream};
pub use controller::{CancelSignal, PendingApproval, RunController};
pub use supervisor::{
    Prompt, Run, RunHooks, RunOptions, RunResult, RunSupervisor, SupervisorOptions, WorkspaceMode,
};
