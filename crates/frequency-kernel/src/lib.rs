//! Frequency Kernel: failure-aware allocation of a fixed frequency pool.
//!
//! A single allocator actor owns the pool. Clients reach it only through a
//! per-client adapter, and the allocator links to the adapter for every grant
//! so that frequencies held by a dead adapter are reclaimed without an
//! explicit release. A shutdown coordinator tears the whole arrangement down
//! in order.

pub mod actors;
pub mod config;
pub mod error;
pub mod messages;
pub mod pool;
pub mod shutdown;
pub mod system;

pub use actors::{Adapter, Allocator, Client, ALLOCATOR_NAME};
pub use config::{ClientConfig, FrequencyConfig, PoolConfig, ShutdownConfig};
pub use error::{CallError, PoolError};
pub use messages::{AdapterOutcome, AllocateReply, ClientReport, ClientStats, DeallocateReply};
pub use pool::{Frequency, FrequencyPool, PoolSnapshot};
pub use shutdown::{AllocatorShutdown, ShutdownCoordinator, ShutdownReport};
pub use system::{ActorRef, ExitReason, Role, Spawned, System};
