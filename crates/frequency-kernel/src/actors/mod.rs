//! Acton-reactive actors for the frequency allocation protocol.
//!
//! ```text
//! Client ──AllocateIntent/DeallocateIntent──► Adapter
//!   Adapter ──Allocate/Deallocate (ReplyTo)──► Allocator
//!   Adapter ◄─────────── reply ─────────────── Allocator
//! Client ◄──────AdapterReply(adapter id)────── Adapter
//! ```
//!
//! The allocator links to each adapter it grants a frequency to. When an
//! adapter is terminated (normally by its client stopping), the System
//! delivers a TerminationNotice and the allocator reclaims what the adapter
//! held. The client itself is never linked to the allocator.

pub mod allocator;
mod adapter;
mod client;

pub use adapter::{Adapter, AdapterState};
pub use allocator::{Allocator, AllocatorState, AllocatorStatus, ALLOCATOR_NAME};
pub use client::{Client, ClientState};
