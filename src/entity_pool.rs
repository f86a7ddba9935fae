//! Single-owner entity handle allocator with a recycling free list.

use smallvec::SmallVec;

use crate::entity::Entity;

#[derive(Clone, Copy, Debug)]
struct Slot {
    version: u16,
    alive: bool,
}

/// Allocates, frees and validates [`Entity`] handles.
///
/// Not internally synchronized: the teacher's `EntityLocations` hands a lock to its
/// callers the same way; thread-safety here is likewise delegated to the caller.
#[derive(Default)]
pub struct EntityPool {
    slots: Vec<Slot>,
    free: SmallVec<[u32; 16]>,
}

impl EntityPool {
    pub fn new() -> Self {
        EntityPool { slots: Vec::new(), free: SmallVec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EntityPool { slots: Vec::with_capacity(capacity), free: SmallVec::new() }
    }

    /// Returns a valid entity with a fresh `(handle, version)` pair, reusing a freed
    /// handle when one is available.
    pub fn allocate(&mut self, tag: u16) -> Entity {
        if let Some(handle) = self.free.pop() {
            let slot = &mut self.slots[handle as usize];
            debug_assert!(!slot.alive);
            slot.alive = true;
            return Entity::compose(handle, tag, slot.version);
        }

        let handle = self.slots.len() as u32;
        self.slots.push(Slot { version: 0, alive: true });
        Entity::compose(handle, tag, 0)
    }

    /// Frees `e.handle()`, bumping its version so stale copies of `e` fail
    /// [`EntityPool::is_alive`]. No-op (returns `false`) if the handle is unknown or
    /// already free.
    pub fn free(&mut self, e: Entity) -> bool {
        let handle = e.handle();
        let Some(slot) = self.slots.get_mut(handle as usize) else {
            return false;
        };
        if !slot.alive || slot.version != e.version() {
            return false;
        }
        slot.alive = false;
        slot.version = slot.version.wrapping_add(1);
        self.free.push(handle);
        true
    }

    /// True iff `e.handle()` is currently allocated with a matching version.
    pub fn is_alive(&self, e: Entity) -> bool {
        match self.slots.get(e.handle() as usize) {
            Some(slot) => slot.alive && slot.version == e.version(),
            None => false,
        }
    }

    /// Returns the entity currently occupying `handle`, or [`Entity::invalid`] if the
    /// slot is free or unknown.
    pub fn restore(&self, handle: u32) -> Entity {
        match self.slots.get(handle as usize) {
            Some(slot) if slot.alive => Entity::compose(handle, 0, slot.version),
            _ => Entity::invalid(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
