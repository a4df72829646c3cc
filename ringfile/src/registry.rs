//! Correlation of kernel completions with caller callbacks.
//!
//! Completions only carry the raw handle an operation was pushed under.
//! [`CallbackRegistry`] maps that handle to a slot of a generational arena
//! holding the pending [`CallbackEntry`].
//!
//! # Design
//!
//! Each slot index is paired with a generation counter that is bumped whenever
//! the slot is freed. A handle maps to the packed (slot, generation) pair, so
//! a stale mapping can never resolve to an entry registered later in the same
//! slot.
//!
//! Registration and resolution both happen on the event loop thread, and the
//! registration of a handle happens-before its ring push, which happens-before
//! its completion. The lock exists so other threads can observe the table
//! (see [`CallbackRegistry::len`]).

use std::{
  collections::{HashMap, VecDeque},
  os::fd::RawFd,
};

use parking_lot::RwLock;

use crate::{
  Error,
  backends::Payload,
  request::CallbackEntry,
};

struct Slot {
  /// Generation counter - incremented each time slot is freed
  generation: u32,
  entry: Option<CallbackEntry>,
}

/// A slot index paired with the generation it was handed out at.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Index {
  generation: u32,
  slot: u32,
}

impl Index {
  fn as_u64(&self) -> u64 {
    ((self.generation as u64) << 32) | (self.slot as u64)
  }

  fn from_u64(packed: u64) -> Self {
    Index {
      slot: (packed & 0xFFFFFFFF) as u32,
      generation: (packed >> 32) as u32,
    }
  }
}

struct Table {
  slots: Vec<Slot>,
  free_list: VecDeque<u32>,
  by_handle: HashMap<RawFd, u64>,
}

impl Table {
  fn next_index(&mut self) -> Index {
    if let Some(slot) = self.free_list.pop_front() {
      // Generation was already incremented when slot was freed
      let generation = self.slots[slot as usize].generation;
      return Index { slot, generation };
    }

    let slot = u32::try_from(self.slots.len())
      .expect("callback registry: out of slots");
    self.slots.push(Slot { generation: 0, entry: None });
    Index { slot, generation: 0 }
  }

  fn take(&mut self, fd: RawFd) -> Option<CallbackEntry> {
    let index = Index::from_u64(self.by_handle.remove(&fd)?);
    let slot = self.slots.get_mut(index.slot as usize)?;
    if slot.generation != index.generation {
      return None;
    }

    let entry = slot.entry.take()?;
    slot.generation = slot.generation.wrapping_add(1);
    self.free_list.push_back(index.slot);
    Some(entry)
  }
}

pub(crate) struct CallbackRegistry {
  table: RwLock<Table>,
}

impl CallbackRegistry {
  pub fn with_capacity(cap: usize) -> Self {
    Self {
      table: RwLock::new(Table {
        slots: Vec::with_capacity(cap),
        free_list: VecDeque::with_capacity(cap),
        by_handle: HashMap::with_capacity(cap),
      }),
    }
  }

  /// Associates `fd` with its pending callback.
  ///
  /// # Panics
  ///
  /// Panics if `fd` already has an entry: two in-flight operations may never
  /// share a handle.
  pub fn register(&self, fd: RawFd, entry: CallbackEntry) {
    let mut table = self.table.write();
    if table.by_handle.contains_key(&fd) {
      drop(table);
      consistency_fault(fd, "registered twice");
    }

    let index = table.next_index();
    let slot = &mut table.slots[index.slot as usize];
    debug_assert!(slot.entry.is_none(), "slot {} should be empty", index.slot);
    slot.entry = Some(entry);
    table.by_handle.insert(fd, index.as_u64());
  }

  /// Completes the operation registered under `fd`: closes the handle, then
  /// runs the callback with `payload`.
  ///
  /// The callback runs even if closing fails; the close failure is returned.
  ///
  /// # Panics
  ///
  /// Panics if nothing is registered under `fd`, meaning the ring reported a
  /// completion this engine never submitted or completed an operation twice.
  pub fn resolve(&self, fd: RawFd, payload: Payload) -> Result<(), Error> {
    // Lock released before any user code runs.
    let Some(entry) = self.table.write().take(fd) else {
      consistency_fault(fd, "has no registered callback");
    };

    let closed = entry.close.run().map_err(|source| Error::Close { fd, source });
    entry.callback.invoke(fd, payload);
    closed
  }

  /// Drops the entry under `fd` without running its callback. The handle is
  /// closed.
  ///
  /// Returns `false` if nothing was registered.
  pub fn purge(&self, fd: RawFd) -> bool {
    let entry = self.table.write().take(fd);
    match entry {
      Some(entry) => {
        if let Err(err) = entry.close.run() {
          tracing::debug!(fd, %err, "closing purged handle failed");
        }
        true
      }
      None => false,
    }
  }

  #[cfg(test)]
  pub fn contains(&self, fd: RawFd) -> bool {
    self.table.read().by_handle.contains_key(&fd)
  }

  /// Number of operations awaiting completion.
  pub fn len(&self) -> usize {
    self.table.read().by_handle.len()
  }
}

#[cold]
pub(crate) fn consistency_fault(fd: RawFd, what: &str) -> ! {
  tracing::error!(fd, "handle {what}");
  panic!("ringfile bookkeeping bug: handle {fd} {what}");
}
