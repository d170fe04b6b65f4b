//! Frequency pool: the free list and assignment table owned by the allocator.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::system::ActorRef;

/// An opaque resource identifier from the fixed universe.
pub type Frequency = u32;

/// Snapshot of the pool as seen by the allocator at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Free frequencies in grant order
    pub free: Vec<Frequency>,
    /// Assigned frequencies and their holders, ordered by frequency
    pub assigned: Vec<(Frequency, ActorRef)>,
}

impl PoolSnapshot {
    /// Total number of frequencies accounted for.
    pub fn total(&self) -> usize {
        self.free.len() + self.assigned.len()
    }

    /// Holder of `freq`, if assigned.
    pub fn holder_of(&self, freq: Frequency) -> Option<&ActorRef> {
        self.assigned
            .iter()
            .find(|(f, _)| *f == freq)
            .map(|(_, holder)| holder)
    }
}

/// Free list plus assignment table.
///
/// Every frequency of the universe is in exactly one of the two at all times.
/// The free list is the queue of returned frequencies followed by the never
/// granted ones: a returned frequency is granted again before any fresh one,
/// and the first one returned is the first one granted.
#[derive(Debug, Clone, Default)]
pub struct FrequencyPool {
    returned: VecDeque<Frequency>,
    fresh: VecDeque<Frequency>,
    assigned: BTreeMap<Frequency, ActorRef>,
}

impl FrequencyPool {
    /// Seed a pool from the universe, in the given order.
    pub fn new(universe: impl IntoIterator<Item = Frequency>) -> Result<Self, PoolError> {
        let mut seen = HashSet::new();
        let mut fresh = VecDeque::new();
        for freq in universe {
            if !seen.insert(freq) {
                return Err(PoolError::DuplicateFrequency(freq));
            }
            fresh.push_back(freq);
        }
        Ok(Self {
            returned: VecDeque::new(),
            fresh,
            assigned: BTreeMap::new(),
        })
    }

    /// Grant the head of the free list to `holder`.
    pub fn allocate(&mut self, holder: ActorRef) -> Result<Frequency, PoolError> {
        let freq = self
            .returned
            .pop_front()
            .or_else(|| self.fresh.pop_front())
            .ok_or(PoolError::NoResource)?;
        self.assigned.insert(freq, holder);
        Ok(freq)
    }

    /// Return `freq` to the pool if `holder` holds it.
    ///
    /// Leaves the pool untouched and reports `NotAllocated` when the frequency
    /// is free or held by someone else.
    pub fn deallocate(&mut self, freq: Frequency, holder: &ActorRef) -> Result<(), PoolError> {
        match self.assigned.get(&freq) {
            Some(current) if current == holder => {
                self.assigned.remove(&freq);
                self.returned.push_back(freq);
                Ok(())
            }
            _ => Err(PoolError::NotAllocated(freq)),
        }
    }

    /// Return every frequency held by `dead` to the pool.
    pub fn reclaim(&mut self, dead: &ActorRef) -> Vec<Frequency> {
        let reclaimed: Vec<Frequency> = self
            .assigned
            .iter()
            .filter(|(_, holder)| *holder == dead)
            .map(|(freq, _)| *freq)
            .collect();
        for freq in &reclaimed {
            self.assigned.remove(freq);
            self.returned.push_back(*freq);
        }
        reclaimed
    }

    /// Undo the grant of `freq` to `holder`, putting it back at the head of
    /// the free list so the grant order is as before the allocation.
    pub fn withdraw(&mut self, freq: Frequency, holder: &ActorRef) -> bool {
        match self.assigned.get(&freq) {
            Some(current) if current == holder => {
                self.assigned.remove(&freq);
                self.returned.push_front(freq);
                true
            }
            _ => false,
        }
    }

    /// Whether `holder` still holds at least one frequency.
    pub fn holds_any(&self, holder: &ActorRef) -> bool {
        self.assigned.values().any(|h| h == holder)
    }

    pub fn free_len(&self) -> usize {
        self.returned.len() + self.fresh.len()
    }

    pub fn assigned_len(&self) -> usize {
        self.assigned.len()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            free: self.returned.iter().chain(&self.fresh).copied().collect(),
            assigned: self
                .assigned
                .iter()
                .map(|(freq, holder)| (*freq, holder.clone()))
                .collect(),
        }
    }
}
