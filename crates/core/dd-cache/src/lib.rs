//! Refresh-and-cache subsystem: owns the published snapshot, debounces
//! refresh triggers and runs at most one refresh cycle at a time.

pub mod coordinator;
pub mod cycle;
pub mod machine;
pub mod store;

pub use coordinator::{Coordinator, CoordinatorHandle, RefreshSettings};
pub use cycle::{CycleOutput, CycleReport, ProxyTable, Sources};
pub use machine::{Effect, Phase, RefreshMachine};
pub use store::SnapshotStore;
