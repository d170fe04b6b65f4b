//! Allocator: sole owner of the frequency pool.
//!
//! All pool transitions happen in `mutate_on` handlers, so the mailbox
//! serializes them:
//!
//! ```text
//! Allocate(requester)        -> grant head of free list, link requester
//! Deallocate(freq, holder)   -> unlink holder, [release delay], return freq
//! TerminationNotice(dead)    -> reclaim everything `dead` held
//! StopAllocator              -> reply Stopped, then terminate (Normal)
//! Inspect                    -> snapshot
//! ```
//!
//! Once `StopAllocator` has been handled, requests still queued are dropped
//! unanswered.

use std::time::Duration;

use acton_reactive::prelude::*;
use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::CallError;
use crate::messages::{
    Allocate, AllocateReply, Deallocate, DeallocateReply, Inspect, ReplyTo, StopAllocator,
    Stopped, TerminationNotice,
};
use crate::pool::{Frequency, FrequencyPool, PoolSnapshot};
use crate::system::{ActorRef, ExitReason, Role, Spawned, System};

/// Well-known name the allocator registers under.
pub const ALLOCATOR_NAME: &str = "frequency";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllocatorStatus {
    #[default]
    Running,
    Stopped,
}

/// Actor state for the allocator.
#[derive(Default, Clone)]
pub struct AllocatorState {
    id: ActorRef,
    pool: FrequencyPool,
    system: System,
    release_delay: Duration,
    status: AllocatorStatus,
}

impl std::fmt::Debug for AllocatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorState")
            .field("id", &self.id)
            .field("free", &self.pool.free_len())
            .field("assigned", &self.pool.assigned_len())
            .field("status", &self.status)
            .finish()
    }
}

/// The frequency allocator.
pub struct Allocator {
    config: PoolConfig,
    system: System,
}

impl Allocator {
    pub fn new(config: PoolConfig, system: System) -> Self {
        Self { config, system }
    }

    /// Spawn the allocator and register it under [`ALLOCATOR_NAME`].
    ///
    /// Fails if the configured universe has duplicates or another allocator
    /// is already registered.
    pub async fn spawn(self, runtime: &mut ActorRuntime) -> Result<Spawned> {
        let pool = FrequencyPool::new(self.config.frequencies.iter().copied())?;

        if let Some(existing) = self.system.whereis_ref(ALLOCATOR_NAME) {
            if self.system.is_alive(&existing) {
                bail!("{ALLOCATOR_NAME} is already registered to {existing}");
            }
        }

        let id = ActorRef::new(Role::Allocator);
        let mut actor = runtime.new_actor_with_name::<AllocatorState>(id.to_string());

        actor.model.id = id.clone();
        actor.model.pool = pool;
        actor.model.system = self.system.clone();
        actor.model.release_delay = Duration::from_millis(self.config.release_delay_ms);

        configure_allocator(&mut actor);

        let handle = actor.start().await;
        self.system.register(id.clone(), handle.clone(), Role::Allocator);
        if !self.system.register_name(ALLOCATOR_NAME, &id) {
            self.system.terminate(&id, ExitReason::Normal).await;
            bail!("{ALLOCATOR_NAME} was registered concurrently");
        }

        info!(
            allocator = %id,
            frequencies = self.config.frequencies.len(),
            "Allocator started"
        );

        Ok(Spawned { id, handle })
    }
}

fn configure_allocator(actor: &mut ManagedActor<Idle, AllocatorState>) {
    actor.mutate_on::<Allocate>(|actor, context| {
        let msg = context.message().clone();
        let model = &mut actor.model;

        if model.status == AllocatorStatus::Stopped {
            debug!(requester = %msg.requester, "Allocate after stop dropped");
            return Reply::ready();
        }

        let reply = match model.pool.allocate(msg.requester.clone()) {
            Ok(freq) if model.system.link(&model.id, &msg.requester) => {
                info!(frequency = freq, holder = %msg.requester, "Frequency granted");
                AllocateReply::Granted(freq)
            }
            Ok(freq) => {
                // Requester died before the link could be made
                model.pool.withdraw(freq, &msg.requester);
                warn!(
                    frequency = freq,
                    requester = %msg.requester,
                    "Requester not live, grant withdrawn"
                );
                AllocateReply::NoResource
            }
            Err(_) => {
                debug!(requester = %msg.requester, "No frequency available");
                AllocateReply::NoResource
            }
        };

        msg.reply_to.send(reply);
        Reply::ready()
    });

    actor.mutate_on::<Deallocate>(|actor, context| {
        let msg = context.message().clone();
        let model = &mut actor.model;

        if model.status == AllocatorStatus::Stopped {
            debug!(requester = %msg.requester, "Deallocate after stop dropped");
            return Reply::ready();
        }

        match model.pool.deallocate(msg.frequency, &msg.requester) {
            Ok(()) => {
                if !model.pool.holds_any(&msg.requester) {
                    model.system.unlink(&model.id, &msg.requester);
                }
                info!(frequency = msg.frequency, holder = %msg.requester, "Frequency released");

                let delay = model.release_delay;
                let reply_to = msg.reply_to;
                let freq = msg.frequency;
                if delay.is_zero() {
                    reply_to.send(DeallocateReply::Released(freq));
                    return Reply::ready();
                }
                Reply::pending(async move {
                    tokio::time::sleep(delay).await;
                    reply_to.send(DeallocateReply::Released(freq));
                })
            }
            Err(e) => {
                warn!(
                    frequency = msg.frequency,
                    requester = %msg.requester,
                    error = %e,
                    "Release of a frequency the requester does not hold"
                );
                msg.reply_to.send(DeallocateReply::NotAllocated(msg.frequency));
                Reply::ready()
            }
        }
    });

    actor.mutate_on::<TerminationNotice>(|actor, context| {
        let msg = context.message().clone();
        let model = &mut actor.model;

        if model.status == AllocatorStatus::Stopped {
            return Reply::ready();
        }

        let reclaimed = model.pool.reclaim(&msg.dead);
        if reclaimed.is_empty() {
            debug!(dead = %msg.dead, reason = ?msg.reason, "Linked actor exited holding nothing");
        } else {
            info!(
                dead = %msg.dead,
                reason = ?msg.reason,
                frequencies = ?reclaimed,
                "Reclaimed frequencies from terminated holder"
            );
        }
        Reply::ready()
    });

    actor.mutate_on::<Inspect>(|actor, context| {
        context.message().reply_to.send(actor.model.pool.snapshot());
        Reply::ready()
    });

    actor.mutate_on::<StopAllocator>(|actor, context| {
        let msg = context.message().clone();
        let model = &mut actor.model;

        if model.status == AllocatorStatus::Stopped {
            return Reply::ready();
        }
        model.status = AllocatorStatus::Stopped;

        info!(
            requester = %msg.requester,
            still_assigned = model.pool.assigned_len(),
            "Allocator stopping"
        );
        msg.reply_to.send(Stopped);
        model
            .system
            .terminate_detached(model.id.clone(), ExitReason::Normal);
        Reply::ready()
    });
}

// ============================================================================
// Call API
// ============================================================================

async fn await_reply<T>(rx: tokio::sync::oneshot::Receiver<T>) -> Result<T, CallError> {
    rx.await.map_err(|_| CallError::Unreachable {
        name: ALLOCATOR_NAME.to_string(),
    })
}

/// Request a frequency for `requester` and wait for the answer.
pub async fn allocate(
    allocator: &ActorHandle,
    requester: ActorRef,
) -> Result<AllocateReply, CallError> {
    let (reply_to, rx) = ReplyTo::channel();
    allocator.send(Allocate { requester, reply_to }).await;
    await_reply(rx).await
}

/// Release `frequency` held by `requester` and wait for the answer.
pub async fn deallocate(
    allocator: &ActorHandle,
    frequency: Frequency,
    requester: ActorRef,
) -> Result<DeallocateReply, CallError> {
    let (reply_to, rx) = ReplyTo::channel();
    allocator
        .send(Deallocate {
            frequency,
            requester,
            reply_to,
        })
        .await;
    await_reply(rx).await
}

/// Stop the allocator and wait for the acknowledgement.
pub async fn stop(allocator: &ActorHandle, requester: ActorRef) -> Result<Stopped, CallError> {
    let (reply_to, rx) = ReplyTo::channel();
    allocator.send(StopAllocator { requester, reply_to }).await;
    await_reply(rx).await
}

/// Fetch a snapshot of the pool.
pub async fn inspect(allocator: &ActorHandle) -> Result<PoolSnapshot, CallError> {
    let (reply_to, rx) = ReplyTo::channel();
    allocator.send(Inspect { reply_to }).await;
    await_reply(rx).await
}
