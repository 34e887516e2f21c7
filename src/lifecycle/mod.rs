//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs, startup.rs):
//!     Load config → Build IO runtime + worker pool (workers.rs)
//!     → Build cache, registry, back-ends → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → Stop accepting → Drain HTTP
//!     → Shut down back-end gateways (cancel exchanges, close sockets)
//! ```
//!
//! # Design Decisions
//! - Worker runtime is separate from the IO runtime
//! - Runtimes are owned by main and dropped outside async context

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod workers;

pub use shutdown::Shutdown;
pub use startup::{Proxy, StartupError};
pub use workers::WorkerPool;
