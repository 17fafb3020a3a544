//! Refresh orchestration for the weather view.
//!
//! `WeatherSession` is the entry point for hosts. The pieces it wires together
//! are exported for hosts that need finer control and for tests.

pub mod coordinator;
pub mod schedule_store;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod subscription;

pub use coordinator::{RefreshCoordinator, RequestToken, TriggerSource};
pub use schedule_store::{
    FileScheduleStore, MemoryScheduleStore, ScheduleRecord, ScheduleStore, ScheduleStoreError,
};
pub use scheduler::RefreshScheduler;
pub use session::{SessionDeps, SessionError, SessionOptions, WeatherSession};
pub use state::{FailureReason, RefreshState};
pub use subscription::StateSubscription;
