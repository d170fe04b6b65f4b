//! Orderly teardown of clients, adapters and the allocator.
//!
//! Order matters: clients are told to stop first, so calls already in flight
//! can still land on a live allocator, and only then is the allocator
//! stopped. The per-client stop is what guarantees every adapter goes away:
//! an adapter whose link was just removed by a release gets no notice from
//! the allocator's exit.

use std::time::Duration;

use acton_reactive::prelude::*;
use tracing::{info, warn};

use crate::actors::allocator::{self, ALLOCATOR_NAME};
use crate::config::ShutdownConfig;
use crate::messages::StopClient;
use crate::system::{ActorRef, Role, System};

/// What happened to the allocator during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorShutdown {
    /// Stop was acknowledged
    Stopped,
    /// No allocator was registered
    AlreadyStopped,
    /// Registered, but dropped the stop request
    Unreachable,
}

/// Result of a shutdown run.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub allocator: AllocatorShutdown,
    /// Clients that were sent a stop instruction
    pub clients_signalled: usize,
    /// Clients or adapters still live after the last poll
    pub lingering: Vec<ActorRef>,
    /// Liveness polls performed
    pub attempts: usize,
}

impl ShutdownReport {
    pub fn is_complete(&self) -> bool {
        self.lingering.is_empty() && self.allocator != AllocatorShutdown::Unreachable
    }
}

/// Runs the shutdown procedure against a [`System`].
pub struct ShutdownCoordinator {
    system: System,
    config: ShutdownConfig,
    id: ActorRef,
}

impl ShutdownCoordinator {
    pub fn new(system: System, config: ShutdownConfig) -> Self {
        Self {
            system,
            config,
            id: ActorRef::named(Role::Coordinator, "shutdown"),
        }
    }

    /// Stop every client, then the allocator, then wait for clients and
    /// adapters to disappear.
    pub async fn run(&self) -> ShutdownReport {
        let clients = self.system.live_with_role(Role::Client);
        for client in &clients {
            if let Some(handle) = self.system.handle_of(client) {
                handle.send(StopClient).await;
            }
        }
        info!(clients = clients.len(), "Stop sent to clients");

        let allocator = match self.system.whereis(ALLOCATOR_NAME) {
            None => {
                info!("Allocator already stopped");
                AllocatorShutdown::AlreadyStopped
            }
            Some(handle) => match allocator::stop(&handle, self.id.clone()).await {
                Ok(_) => {
                    info!("Allocator stopped");
                    AllocatorShutdown::Stopped
                }
                Err(e) => {
                    warn!(error = %e, "Allocator did not acknowledge stop");
                    AllocatorShutdown::Unreachable
                }
            },
        };

        let interval = Duration::from_millis(self.config.retry_interval_ms);
        let mut attempts = 0;
        let mut lingering = self.lingering();
        while !lingering.is_empty() && attempts < self.config.max_retries {
            tokio::time::sleep(interval).await;
            attempts += 1;
            lingering = self.lingering();
        }

        if lingering.is_empty() {
            info!(attempts, "Shutdown complete");
        } else {
            warn!(attempts, lingering = ?lingering, "Actors still live after shutdown");
        }

        ShutdownReport {
            allocator,
            clients_signalled: clients.len(),
            lingering,
            attempts,
        }
    }

    fn lingering(&self) -> Vec<ActorRef> {
        let mut ids = self.system.live_with_role(Role::Client);
        ids.extend(self.system.live_with_role(Role::Adapter));
        ids
    }
}
