//! Actor identities, the well-known name registry and the link table.
//!
//! acton-reactive has no notion of links, so the [`System`] keeps an explicit
//! supervision table next to the runtime:
//!
//! ```text
//! live:  ActorRef -> (ActorHandle, Role)
//! names: "frequency" -> ActorRef
//! links: ActorRef -> {ActorRef}        (always symmetric)
//! ```
//!
//! Every termination goes through [`System::terminate`], which stops the
//! actor, forgets its name, tears down its links and delivers a
//! [`TerminationNotice`] to each former peer.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use acton_reactive::prelude::*;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::messages::TerminationNotice;

/// What part an actor plays in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Allocator,
    Adapter,
    Client,
    Coordinator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Allocator => "allocator",
            Role::Adapter => "adapter",
            Role::Client => "client",
            Role::Coordinator => "coordinator",
        }
    }
}

/// Comparable identity of an actor.
///
/// Stays meaningful after the actor is gone, but only as a key: the live
/// handle has to be looked up through the [`System`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorRef(String);

impl ActorRef {
    /// Fresh identity with a random suffix, e.g. `adapter:1f3a9c2e`.
    pub fn new(role: Role) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}:{}", role.as_str(), &suffix[..8]))
    }

    /// Identity with a caller-chosen suffix.
    pub fn named(role: Role, name: &str) -> Self {
        Self(format!("{}:{}", role.as_str(), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an actor went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Orderly stop
    Normal,
    /// Forced termination
    Killed,
    /// Adapter could not reach the allocator
    AddressingFailure,
}

impl ExitReason {
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

/// Identity and handle of a spawned actor.
#[derive(Debug, Clone)]
pub struct Spawned {
    pub id: ActorRef,
    pub handle: ActorHandle,
}

#[derive(Clone)]
struct LiveActor {
    handle: ActorHandle,
    role: Role,
}

#[derive(Default)]
struct SystemInner {
    live: DashMap<ActorRef, LiveActor>,
    names: DashMap<String, ActorRef>,
    links: DashMap<ActorRef, HashSet<ActorRef>>,
}

/// Shared supervision table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct System {
    inner: Arc<SystemInner>,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("live", &self.inner.live.len())
            .field("names", &self.inner.names.len())
            .field("links", &self.inner.links.len())
            .finish()
    }
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a started actor as live.
    pub fn register(&self, id: ActorRef, handle: ActorHandle, role: Role) {
        debug!(actor = %id, role = role.as_str(), "registered");
        self.inner.live.insert(id, LiveActor { handle, role });
    }

    /// Bind a well-known name to a live actor.
    ///
    /// Returns `false` if the actor is not live or the name is already taken
    /// by a live actor.
    pub fn register_name(&self, name: &str, id: &ActorRef) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        if let Some(current) = self.whereis_ref(name) {
            if self.is_alive(&current) {
                return false;
            }
        }
        self.inner.names.insert(name.to_string(), id.clone());
        true
    }

    /// Resolve a well-known name to a live handle. Absence is not an error.
    pub fn whereis(&self, name: &str) -> Option<ActorHandle> {
        let id = self.whereis_ref(name)?;
        self.handle_of(&id)
    }

    pub fn whereis_ref(&self, name: &str) -> Option<ActorRef> {
        self.inner.names.get(name).map(|entry| entry.value().clone())
    }

    pub fn handle_of(&self, id: &ActorRef) -> Option<ActorHandle> {
        self.inner.live.get(id).map(|entry| entry.handle.clone())
    }

    pub fn is_alive(&self, id: &ActorRef) -> bool {
        self.inner.live.contains_key(id)
    }

    /// Live actors playing `role`, sorted for stable output.
    pub fn live_with_role(&self, role: Role) -> Vec<ActorRef> {
        let mut ids: Vec<ActorRef> = self
            .inner
            .live
            .iter()
            .filter(|entry| entry.role == role)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Establish a bidirectional link. Both parties must be live.
    pub fn link(&self, a: &ActorRef, b: &ActorRef) -> bool {
        if !self.is_alive(a) || !self.is_alive(b) {
            return false;
        }
        self.inner.links.entry(a.clone()).or_default().insert(b.clone());
        self.inner.links.entry(b.clone()).or_default().insert(a.clone());
        debug!(a = %a, b = %b, "linked");
        true
    }

    /// Remove the link between `a` and `b`, if any.
    pub fn unlink(&self, a: &ActorRef, b: &ActorRef) {
        self.drop_half_link(a, b);
        self.drop_half_link(b, a);
        debug!(a = %a, b = %b, "unlinked");
    }

    pub fn links_of(&self, id: &ActorRef) -> HashSet<ActorRef> {
        self.inner
            .links
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn drop_half_link(&self, from: &ActorRef, to: &ActorRef) {
        let now_empty = match self.inner.links.get_mut(from) {
            Some(mut peers) => {
                peers.remove(to);
                peers.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inner.links.remove_if(from, |_, peers| peers.is_empty());
        }
    }

    /// Terminate `id` and notify its linked peers.
    ///
    /// Returns `false` if the actor was not live. Must not be awaited from
    /// inside the terminating actor's own handler; spawn it instead.
    pub async fn terminate(&self, id: &ActorRef, reason: ExitReason) -> bool {
        let Some((_, actor)) = self.inner.live.remove(id) else {
            debug!(actor = %id, "terminate: not live");
            return false;
        };
        self.inner.names.retain(|_, owner| owner != id);

        if let Err(e) = actor.handle.stop().await {
            warn!(actor = %id, error = ?e, "actor did not stop cleanly");
        }

        let peers = self
            .inner
            .links
            .remove(id)
            .map(|(_, peers)| peers)
            .unwrap_or_default();

        info!(
            actor = %id,
            role = actor.role.as_str(),
            reason = ?reason,
            linked = peers.len(),
            "actor terminated"
        );

        for peer in peers {
            self.drop_half_link(&peer, id);
            let Some(handle) = self.handle_of(&peer) else {
                continue;
            };
            handle
                .send(TerminationNotice {
                    dead: id.clone(),
                    reason,
                })
                .await;
        }
        true
    }

    /// Fire-and-forget [`System::terminate`], for actors stopping themselves.
    pub fn terminate_detached(&self, id: ActorRef, reason: ExitReason) {
        let system = self.clone();
        tokio::spawn(async move {
            system.terminate(&id, reason).await;
        });
    }
}
