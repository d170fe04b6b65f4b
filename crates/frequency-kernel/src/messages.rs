//! Message types exchanged between the allocator, adapters and clients.
//!
//! Requests that expect an answer carry a [`ReplyTo`] slot. Every other
//! message is fire-and-forget.
//!
//! Replies are not routed back as envelopes to the caller's mailbox: the
//! adapter awaits the allocator's answer inside the handler that relays it,
//! and the coordinator and tests call the allocator from outside any actor.
//! Both need a future to await, so the caller keeps the oneshot receiver.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::pool::{Frequency, PoolSnapshot};
use crate::system::{ActorRef, ExitReason};

/// One-shot reply slot that can travel inside a cloneable message.
///
/// Only the first [`ReplyTo::send`] is delivered. If every copy is dropped
/// unanswered, the waiting caller sees a closed channel.
pub struct ReplyTo<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> ReplyTo<T> {
    /// Create a reply slot and the receiver the caller waits on.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the reply. Returns `false` if it was already sent or the caller
    /// stopped waiting.
    pub fn send(&self, value: T) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

impl<T> Clone for ReplyTo<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> fmt::Debug for ReplyTo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyTo")
    }
}

// ============================================================================
// Allocator Messages
// ============================================================================

/// Request a frequency on behalf of `requester`.
#[derive(Debug, Clone)]
pub struct Allocate {
    pub requester: ActorRef,
    pub reply_to: ReplyTo<AllocateReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateReply {
    Granted(Frequency),
    NoResource,
}

/// Return `frequency` previously granted to `requester`.
#[derive(Debug, Clone)]
pub struct Deallocate {
    pub frequency: Frequency,
    pub requester: ActorRef,
    pub reply_to: ReplyTo<DeallocateReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeallocateReply {
    Released(Frequency),
    NotAllocated(Frequency),
}

/// Ask the allocator to stop after replying.
#[derive(Debug, Clone)]
pub struct StopAllocator {
    pub requester: ActorRef,
    pub reply_to: ReplyTo<Stopped>,
}

/// Acknowledgement of [`StopAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// Request a copy of the pool state.
#[derive(Debug, Clone)]
pub struct Inspect {
    pub reply_to: ReplyTo<PoolSnapshot>,
}

/// Delivered by the [`System`](crate::system::System) to every actor linked
/// to one that terminated.
#[derive(Debug, Clone)]
pub struct TerminationNotice {
    pub dead: ActorRef,
    pub reason: ExitReason,
}

// ============================================================================
// Adapter Messages
// ============================================================================

/// Client asks its adapter for a frequency.
#[derive(Debug, Clone)]
pub struct AllocateIntent {
    pub client: ActorRef,
}

/// Client asks its adapter to release a frequency.
#[derive(Debug, Clone)]
pub struct DeallocateIntent {
    pub frequency: Frequency,
    pub client: ActorRef,
}

/// Result relayed back to a client, tagged with the adapter that produced it.
#[derive(Debug, Clone)]
pub struct AdapterReply {
    pub adapter: ActorRef,
    pub outcome: AdapterOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterOutcome {
    Granted(Frequency),
    NoResource,
    Released(Frequency),
    NotAllocated(Frequency),
    /// The allocator could not be addressed or dropped the request
    Unreachable,
}

impl From<AllocateReply> for AdapterOutcome {
    fn from(reply: AllocateReply) -> Self {
        match reply {
            AllocateReply::Granted(freq) => AdapterOutcome::Granted(freq),
            AllocateReply::NoResource => AdapterOutcome::NoResource,
        }
    }
}

impl From<DeallocateReply> for AdapterOutcome {
    fn from(reply: DeallocateReply) -> Self {
        match reply {
            DeallocateReply::Released(freq) => AdapterOutcome::Released(freq),
            DeallocateReply::NotAllocated(freq) => AdapterOutcome::NotAllocated(freq),
        }
    }
}

// ============================================================================
// Client Messages
// ============================================================================

/// Start the next acquire cycle.
#[derive(Debug, Clone)]
pub struct BeginCycle;

/// The hold period for `frequency` is over.
#[derive(Debug, Clone)]
pub struct ReleaseDue {
    pub frequency: Frequency,
}

/// Instruction from the shutdown coordinator.
#[derive(Debug, Clone)]
pub struct StopClient;

/// Counters kept by a client over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub grants: usize,
    pub denials: usize,
    pub releases: usize,
    pub failures: usize,
}

/// Summary sent to the client's observer when it stops.
#[derive(Debug, Clone)]
pub struct ClientReport {
    pub client: ActorRef,
    pub stats: ClientStats,
    /// Frequency held at the moment of the stop, reclaimed through the link
    pub held: Option<Frequency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_to_delivers_once() {
        let (reply_to, rx) = ReplyTo::channel();
        let copy = reply_to.clone();
        assert!(reply_to.send(Stopped));
        assert!(!copy.send(Stopped));
        assert_eq!(rx.await.unwrap(), Stopped);
    }

    #[tokio::test]
    async fn test_dropped_reply_to_closes_channel() {
        let (reply_to, rx) = ReplyTo::<AllocateReply>::channel();
        drop(reply_to);
        assert!(rx.await.is_err());
    }
}
