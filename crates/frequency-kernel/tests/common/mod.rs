//! Shared helpers for the actor-level tests.
#![allow(dead_code)]

use std::sync::Arc;

use acton_reactive::prelude::*;
use tokio::sync::RwLock;
use tokio::time::Duration;

use frequency_kernel::messages::AdapterReply;
use frequency_kernel::{ActorRef, Allocator, PoolConfig, Role, Spawned, System};

/// Time given to mailboxes and detached teardown tasks to drain.
pub const SETTLE: Duration = Duration::from_millis(80);

pub async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

pub fn pool_config(frequencies: &[u32], release_delay_ms: u64) -> PoolConfig {
    PoolConfig {
        frequencies: frequencies.to_vec(),
        release_delay_ms,
    }
}

pub async fn spawn_allocator(
    runtime: &mut ActorRuntime,
    system: &System,
    config: PoolConfig,
) -> Spawned {
    Allocator::new(config, system.clone())
        .spawn(runtime)
        .await
        .unwrap()
}

/// Silent actor standing in for an adapter when calling the allocator directly.
#[derive(Default, Debug, Clone)]
struct ProbeState;

pub async fn spawn_probe(runtime: &mut ActorRuntime, system: &System) -> Spawned {
    let id = ActorRef::new(Role::Adapter);
    let actor = runtime.new_actor_with_name::<ProbeState>(id.to_string());
    let handle = actor.start().await;
    system.register(id.clone(), handle.clone(), Role::Adapter);
    Spawned { id, handle }
}

/// Stand-in client that records every adapter reply it receives.
#[derive(Default, Clone)]
struct RecorderState {
    replies: Arc<RwLock<Vec<AdapterReply>>>,
}

impl std::fmt::Debug for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderState").finish()
    }
}

pub async fn spawn_recorder(
    runtime: &mut ActorRuntime,
    replies: Arc<RwLock<Vec<AdapterReply>>>,
) -> ActorHandle {
    let mut actor = runtime.new_actor_with_name::<RecorderState>("Recorder".to_string());
    actor.model.replies = replies;

    actor.mutate_on::<AdapterReply>(|actor, context| {
        let msg = context.message().clone();
        let replies = actor.model.replies.clone();

        Reply::pending(async move {
            replies.write().await.push(msg);
        })
    });

    actor.start().await
}
