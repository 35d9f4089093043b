//! Watcher pipeline turning object-store notifications into job runs
//!
//! # Overview
//!
//! For every message delivered on the bus subscription the watcher:
//! 1. Converts the payload into canonical records
//! 2. Reads the job table
//! 3. Matches each record against each job's filter
//! 4. Launches every matching job with the record on its standard input
//!
//! # Modules
//!
//! - [`event`]: Notification parsing into canonical records
//! - [`jobs`]: Job table loading
//! - [`filter`]: Pattern matching on event name, bucket and object key
//! - [`dispatch`]: Record-by-job matching and launch
//! - [`runner`]: Fire-and-forget process spawning
//! - [`guard`]: Panic containment for entry points
//! - [`logging`]: Structured logging configuration
//! - [`watcher`]: The service tying the pipeline to the bus

pub mod dispatch;
pub mod event;
pub mod filter;
pub mod guard;
pub mod jobs;
pub mod logging;
pub mod runner;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use dispatch::{DispatchSummary, Dispatcher};
pub use event::{CanonicalEventRecord, EventConverter};
pub use filter::{CompiledFilter, JobFilter};
pub use jobs::{JobSpec, JobTable};
pub use runner::{JobLauncher, ProcessJobRunner};
pub use watcher::Watcher;
