pub mod coordinator;
pub mod merge;
pub mod supervisor;

pub use coordinator::SyncCoordinator;
pub use merge::MergeOutcome;
pub use supervisor::RealtimeSupervisor;
