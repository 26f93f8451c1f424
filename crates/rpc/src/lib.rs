//! Tag-dispatched asynchronous RPC serving engine.
//!
//! Every in-flight call is a [`CallState`] machine stored in a call table and
//! addressed by an opaque [`Tag`]. Transports report progress by pushing
//! `(tag, ok)` events into a [`CompletionQueue`]; a pool of dispatch workers
//! pops events and advances the named record by exactly one step:
//!
//! * ARMED: the transport matched a call. A replacement record is armed for
//!   the same method, then the handler runs.
//! * PROCESSING: the response is submitted and the record moves to FINISHING.
//! * FINISHING: the transport flushed the response; the record is destroyed.
//!
//! Handlers are bound per method through [`MethodBinding`], either inline on
//! the dispatch worker, deferred through a [`Reply`], or offloaded to a
//! [`cqrpc_worker::OffloadPool`]. [`MemTransport`] serves calls in process;
//! network transports build on [`Acceptor`].

#![warn(missing_docs)]

pub mod binding;
pub mod call;
pub mod error;
pub mod queue;
pub mod registry;
pub mod server;
pub mod stats;
pub mod status;
pub mod table;
pub mod tag;
pub mod transport;

mod dispatch;

pub use binding::{Handler, MethodBinding, Reply};
pub use call::CallState;
pub use error::{Error, Result};
pub use queue::{CompletionQueue, CompletionSink, QueueClosed};
pub use registry::ServiceRegistry;
pub use server::{Server, ServerBuilder, ShutdownReport};
pub use stats::ServerStats;
pub use status::{Outcome, Status, StatusCode};
pub use table::{CallSnapshot, Violation};
pub use tag::{CompletionEvent, Tag};
pub use transport::{Acceptor, CallContext, CallSlot, Completion, IncomingCall, MemTransport, Offer, PendingCall, Responder, Transport};
