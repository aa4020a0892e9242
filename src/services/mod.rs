pub mod active_jobs;
pub mod backend_rpc;
pub mod completion_ledger;
pub mod events;
pub mod job_state;
pub mod json_store;
pub mod lifecycle;
pub mod status_poller;
pub mod tracked_store;

pub use active_jobs::ActiveJobSet;
pub use backend_rpc::{BackendRpc, HttpBackendRpc};
pub use completion_ledger::CompletionLedger;
pub use events::JobEventSink;
pub use lifecycle::LifecycleOrchestrator;
pub use status_poller::{PollEvent, StatusPoller, DEFAULT_POLL_INTERVAL_MS};
pub use tracked_store::TrackedJobStore;
