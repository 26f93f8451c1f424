//! Worker thread primitives shared by the dispatch engine and its transports.
//!
//! * [`WorkerPool`]: fixed pool of named OS threads, each running one loop body.
//! * [`OffloadPool`]: bounded blocking pool for handlers that may be slow.
//! * [`WorkerRegistry`]: status snapshots for pool workers.
//! * [`TaskClass`]: execution classes used for naming and tracing.

#![warn(missing_docs)]

mod class;
mod offload;
mod panic;
mod pool;
mod registry;
mod spawn;

pub use class::TaskClass;
pub use offload::OffloadPool;
pub use panic::{join_error_panic_message, panic_message};
pub use pool::{PoolReport, WorkerContext, WorkerPool};
pub use registry::{WorkerRecord, WorkerRegistry, WorkerState};
pub use spawn::{spawn_named_thread, spawn_task};
