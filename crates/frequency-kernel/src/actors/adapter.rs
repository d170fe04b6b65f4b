//! Adapter: per-client relay between a client and the allocator.
//!
//! Intents from the client become calls against whatever the well-known
//! allocator name resolves to at that moment; answers go back to the client
//! as [`AdapterReply`] messages tagged with this adapter's identity. The
//! allocator links to the adapter (not to the client) when it grants a
//! frequency, so the adapter is what gets reclaimed when the client side
//! dies.
//!
//! If the name does not resolve or the allocator drops the request, the
//! client gets `Unreachable` and the adapter terminates with
//! `AddressingFailure`. Nothing outside the adapter is affected.

use acton_reactive::prelude::*;
use tracing::{debug, info, warn};

use crate::actors::allocator::{self, ALLOCATOR_NAME};
use crate::messages::{
    AdapterOutcome, AdapterReply, AllocateIntent, DeallocateIntent, TerminationNotice,
};
use crate::system::{ActorRef, ExitReason, Role, Spawned, System};

/// Actor state for an adapter.
#[derive(Default, Clone)]
pub struct AdapterState {
    id: ActorRef,
    client: Option<ActorHandle>,
    system: System,
}

impl std::fmt::Debug for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterState")
            .field("id", &self.id)
            .field("client", &self.client.is_some())
            .finish()
    }
}

/// Relay actor owned by one client.
pub struct Adapter {
    client: ActorHandle,
    system: System,
}

impl Adapter {
    pub fn new(client: ActorHandle, system: System) -> Self {
        Self { client, system }
    }

    pub async fn spawn(self, runtime: &mut ActorRuntime) -> Spawned {
        let id = ActorRef::new(Role::Adapter);
        let mut actor = runtime.new_actor_with_name::<AdapterState>(id.to_string());

        actor.model.id = id.clone();
        actor.model.client = Some(self.client);
        actor.model.system = self.system.clone();

        configure_adapter(&mut actor);

        let handle = actor.start().await;
        self.system.register(id.clone(), handle.clone(), Role::Adapter);
        debug!(adapter = %id, "Adapter started");

        Spawned { id, handle }
    }
}

/// Relay the outcome to the client; on an addressing failure, take the
/// adapter down afterwards.
async fn forward(
    client: Option<ActorHandle>,
    system: System,
    id: ActorRef,
    outcome: AdapterOutcome,
) {
    match client {
        Some(client) => {
            client
                .send(AdapterReply {
                    adapter: id.clone(),
                    outcome,
                })
                .await;
        }
        None => warn!(adapter = %id, "Adapter has no client to answer"),
    }

    if outcome == AdapterOutcome::Unreachable {
        warn!(adapter = %id, "Allocator unreachable, adapter terminating");
        system.terminate_detached(id, ExitReason::AddressingFailure);
    }
}

fn configure_adapter(actor: &mut ManagedActor<Idle, AdapterState>) {
    // act_on: a pending call never blocks the mailbox
    actor.act_on::<AllocateIntent>(|actor, context| {
        let msg = context.message().clone();
        let id = actor.model.id.clone();
        let client = actor.model.client.clone();
        let system = actor.model.system.clone();

        Reply::pending(async move {
            debug!(adapter = %id, client = %msg.client, "Relaying allocate");
            let outcome = match system.whereis(ALLOCATOR_NAME) {
                Some(handle) => allocator::allocate(&handle, id.clone())
                    .await
                    .map(AdapterOutcome::from)
                    .unwrap_or(AdapterOutcome::Unreachable),
                None => AdapterOutcome::Unreachable,
            };
            forward(client, system, id, outcome).await;
        })
    });

    actor.act_on::<DeallocateIntent>(|actor, context| {
        let msg = context.message().clone();
        let id = actor.model.id.clone();
        let client = actor.model.client.clone();
        let system = actor.model.system.clone();

        Reply::pending(async move {
            debug!(
                adapter = %id,
                client = %msg.client,
                frequency = msg.frequency,
                "Relaying deallocate"
            );
            let outcome = match system.whereis(ALLOCATOR_NAME) {
                Some(handle) => allocator::deallocate(&handle, msg.frequency, id.clone())
                    .await
                    .map(AdapterOutcome::from)
                    .unwrap_or(AdapterOutcome::Unreachable),
                None => AdapterOutcome::Unreachable,
            };
            forward(client, system, id, outcome).await;
        })
    });

    // Linked allocator went away. A normal stop leaves the adapter running.
    actor.act_on::<TerminationNotice>(|actor, context| {
        let msg = context.message().clone();
        let id = actor.model.id.clone();

        if msg.reason.is_normal() {
            debug!(adapter = %id, dead = %msg.dead, "Linked peer stopped normally");
        } else {
            info!(
                adapter = %id,
                dead = %msg.dead,
                reason = ?msg.reason,
                "Linked peer died, adapter terminating"
            );
            actor
                .model
                .system
                .terminate_detached(id, ExitReason::Killed);
        }
        Reply::ready()
    });
}
