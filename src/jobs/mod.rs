//! Job lifecycle core
//!
//! The registry is the single source of truth for job state; the scheduler
//! is the only component that drives a job through its state machine. Both
//! synchronous and asynchronous submissions share the same state machine, so
//! every observer sees one state model regardless of execution mode.

pub mod poller;
pub mod pools;
pub mod registry;
pub mod scheduler;

pub use poller::{JobLookup, StatusPoller, WatchHandle};
pub use pools::{ConcurrencyPool, DomainPool, PoolToken, ScrapePools};
pub use registry::{JobRegistry, ProgressHandle};
pub use scheduler::JobScheduler;
