//! Client: demonstration actor cycling acquire, hold, release.
//!
//! ```text
//! BeginCycle ──AllocateIntent──► adapter
//!   Granted(f)   → hold, then ReleaseDue(f) ──DeallocateIntent──► adapter
//!   Released(f)  → pause, then BeginCycle
//!   NoResource   → pause, then BeginCycle
//!   Unreachable  → idle until StopClient
//! StopClient     → kill the adapter, then stop (handled from any state)
//! ```
//!
//! Timers are detached tasks that post back into the mailbox, so a
//! `StopClient` is handled whether the client is waiting on a reply or
//! holding a frequency.

use std::time::Duration;

use acton_reactive::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actors::adapter::Adapter;
use crate::config::ClientConfig;
use crate::messages::{
    AdapterOutcome, AdapterReply, AllocateIntent, BeginCycle, ClientReport, ClientStats,
    DeallocateIntent, ReleaseDue, StopClient,
};
use crate::pool::Frequency;
use crate::system::{ActorRef, ExitReason, Role, Spawned, System};

/// Actor state for a client.
#[derive(Default, Clone)]
pub struct ClientState {
    id: ActorRef,
    adapter: Option<Spawned>,
    system: System,
    hold: Duration,
    pause: Duration,
    held: Option<Frequency>,
    stats: ClientStats,
    stopping: bool,
    observer: Option<mpsc::Sender<ClientReport>>,
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("id", &self.id)
            .field("held", &self.held)
            .field("stats", &self.stats)
            .field("stopping", &self.stopping)
            .finish()
    }
}

/// Demonstration client with its own adapter.
pub struct Client {
    config: ClientConfig,
    system: System,
    observer: Option<mpsc::Sender<ClientReport>>,
}

impl Client {
    pub fn new(config: ClientConfig, system: System) -> Self {
        Self {
            config,
            system,
            observer: None,
        }
    }

    /// Receive a [`ClientReport`] when the client stops.
    pub fn with_observer(mut self, tx: mpsc::Sender<ClientReport>) -> Self {
        self.observer = Some(tx);
        self
    }

    /// Spawn the client together with its adapter.
    ///
    /// Returns the client and the adapter. The first cycle starts as soon as
    /// the client is running.
    pub async fn spawn(self, runtime: &mut ActorRuntime) -> (Spawned, Spawned) {
        let id = ActorRef::new(Role::Client);
        let mut actor = runtime.new_actor_with_name::<ClientState>(id.to_string());

        let adapter = Adapter::new(actor.handle().clone(), self.system.clone())
            .spawn(runtime)
            .await;

        actor.model.id = id.clone();
        actor.model.adapter = Some(adapter.clone());
        actor.model.system = self.system.clone();
        actor.model.hold = Duration::from_millis(self.config.hold_ms);
        actor.model.pause = Duration::from_millis(self.config.pause_ms);
        actor.model.observer = self.observer;

        actor.after_start(|actor| {
            let handle = actor.handle().clone();
            Reply::pending(async move {
                handle.send(BeginCycle).await;
            })
        });

        configure_client(&mut actor);

        let handle = actor.start().await;
        self.system.register(id.clone(), handle.clone(), Role::Client);
        info!(client = %id, adapter = %adapter.id, "Client started");

        (Spawned { id, handle }, adapter)
    }
}

/// Post `msg` back to the client after `delay`.
fn schedule<M>(handle: ActorHandle, delay: Duration, msg: M)
where
    M: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        handle.send(msg).await;
    });
}

fn configure_client(actor: &mut ManagedActor<Idle, ClientState>) {
    actor.mutate_on::<BeginCycle>(|actor, _context| {
        if actor.model.stopping {
            return Reply::ready();
        }
        let Some(adapter) = actor.model.adapter.clone() else {
            return Reply::ready();
        };
        let client = actor.model.id.clone();

        Reply::pending(async move {
            adapter.handle.send(AllocateIntent { client }).await;
        })
    });

    actor.mutate_on::<ReleaseDue>(|actor, context| {
        let frequency = context.message().frequency;
        if actor.model.stopping {
            return Reply::ready();
        }
        let Some(adapter) = actor.model.adapter.clone() else {
            return Reply::ready();
        };
        let client = actor.model.id.clone();

        Reply::pending(async move {
            adapter
                .handle
                .send(DeallocateIntent { frequency, client })
                .await;
        })
    });

    actor.mutate_on::<AdapterReply>(|actor, context| {
        let msg = context.message().clone();
        let me = actor.handle().clone();
        let model = &mut actor.model;

        if model.stopping {
            return Reply::ready();
        }
        let ours = model.adapter.as_ref().is_some_and(|a| a.id == msg.adapter);
        if !ours {
            warn!(client = %model.id, adapter = %msg.adapter, "Reply from unknown adapter ignored");
            return Reply::ready();
        }

        match msg.outcome {
            AdapterOutcome::Granted(freq) => {
                model.held = Some(freq);
                model.stats.grants += 1;
                debug!(client = %model.id, frequency = freq, "Holding frequency");
                schedule(me, model.hold, ReleaseDue { frequency: freq });
            }
            AdapterOutcome::NoResource => {
                model.stats.denials += 1;
                debug!(client = %model.id, "No frequency, retrying later");
                schedule(me, model.pause, BeginCycle);
            }
            AdapterOutcome::Released(freq) => {
                model.held = None;
                model.stats.releases += 1;
                debug!(client = %model.id, frequency = freq, "Released frequency");
                schedule(me, model.pause, BeginCycle);
            }
            AdapterOutcome::NotAllocated(freq) => {
                model.held = None;
                model.stats.failures += 1;
                warn!(client = %model.id, frequency = freq, "Release refused");
                schedule(me, model.pause, BeginCycle);
            }
            AdapterOutcome::Unreachable => {
                // Nothing is held once the allocator is gone
                model.held = None;
                model.stats.failures += 1;
                warn!(client = %model.id, "Adapter lost the allocator, waiting for stop");
            }
        }
        Reply::ready()
    });

    actor.mutate_on::<StopClient>(|actor, _context| {
        let model = &mut actor.model;
        if model.stopping {
            return Reply::ready();
        }
        model.stopping = true;

        info!(client = %model.id, stats = ?model.stats, held = ?model.held, "Client stopping");

        let report = ClientReport {
            client: model.id.clone(),
            stats: model.stats.clone(),
            held: model.held,
        };
        let observer = model.observer.clone();
        let system = model.system.clone();
        let adapter = model.adapter.as_ref().map(|a| a.id.clone());
        let id = model.id.clone();

        // Self-stop cannot run inside the handler
        tokio::spawn(async move {
            if let Some(adapter) = adapter {
                system.terminate(&adapter, ExitReason::Killed).await;
            }
            system.terminate(&id, ExitReason::Normal).await;
            if let Some(observer) = observer {
                let _ = observer.send(report).await;
            }
        });
        Reply::ready()
    });
}
