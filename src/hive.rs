//! Segmented, stable-address pool with an intrusive free list and geometric group
//! growth.

use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use crate::bitset::DynamicBitset;
use crate::constants::INITIAL_HIVE_GROUP_CAPACITY;

const NO_FREE_SLOT: u32 = u32::MAX;

struct Group<T> {
    storage: Box<[MaybeUninit<T>]>,
    liveness: DynamicBitset,
    first_available: u32,
    available_count: u32,
}

impl<T> Group<T> {
    fn new(capacity: usize) -> Self {
        let mut storage: Vec<MaybeUninit<T>> = (0..capacity).map(|_| MaybeUninit::uninit()).collect();
        for i in 0..capacity {
            let next = if i + 1 < capacity { (i + 1) as u32 } else { NO_FREE_SLOT };
            unsafe {
                ptr::write(storage[i].as_mut_ptr() as *mut u32, next);
            }
        }
        Group {
            storage: storage.into_boxed_slice(),
            liveness: DynamicBitset::with_len(capacity),
            first_available: if capacity > 0 { 0 } else { NO_FREE_SLOT },
            available_count: capacity as u32,
        }
    }

    fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// # Safety
    /// Caller must have checked `available_count > 0`.
    unsafe fn construct(&mut self, value: T) -> (NonNull<u8>, u32) {
        let index = self.first_available;
        debug_assert_ne!(index, NO_FREE_SLOT, "construct called on a full group");
        let slot_ptr = self.storage[index as usize].as_mut_ptr();
        self.first_available = ptr::read(slot_ptr as *const u32);
        self.available_count -= 1;
        ptr::write(slot_ptr, value);
        self.liveness.set(index as usize).expect("index within group capacity");
        (NonNull::new_unchecked(slot_ptr as *mut u8), index)
    }

    /// Returns `false` (a no-op) on double-free or an out-of-range index.
    fn destruct(&mut self, index: u32) -> bool {
        match self.liveness.test(index as usize) {
            Ok(true) => {}
            _ => {
                debug_assert!(false, "double-free or out-of-range hive slot {index}");
                return false;
            }
        }
        let slot_ptr = self.storage[index as usize].as_mut_ptr();
        unsafe {
            ptr::drop_in_place(slot_ptr);
            ptr::write(slot_ptr as *mut u32, self.first_available);
        }
        self.first_available = index;
        self.available_count += 1;
        self.liveness.reset(index as usize).expect("index within group capacity");
        true
    }

    fn get(&self, index: u32) -> Option<NonNull<u8>> {
        match self.liveness.test(index as usize) {
            Ok(true) => Some(unsafe { NonNull::new_unchecked(self.storage[index as usize].as_ptr() as *mut u8) }),
            _ => None,
        }
    }
}

/// Growable container of `T` handing out stable addresses and dense indices.
///
/// Structure: a sequence of groups. The first has capacity
/// [`crate::constants::INITIAL_HIVE_GROUP_CAPACITY`]; each subsequent group doubles
/// the previous one's. A slot's address, once handed out by [`Hive::construct`],
/// stays valid until the matching [`Hive::destruct`] or the hive's own drop.
///
/// Requires `size_of::<T>() >= size_of::<u32>()` to embed the free-list link.
pub struct Hive<T> {
    groups: Vec<Group<T>>,
    group_starts: Vec<u32>,
}

impl<T> Default for Hive<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Hive<T> {
    pub fn new() -> Self {
        assert!(
            core::mem::size_of::<T>() >= core::mem::size_of::<u32>(),
            "Hive<T> requires size_of::<T>() >= size_of::<u32>() to embed its free-list link"
        );
        Hive { groups: Vec::new(), group_starts: Vec::new() }
    }

    /// Inserts `value`, returning a pointer valid until the matching `destruct` and
    /// the dense index that recovers it via [`Hive::get`]/[`Hive::destruct`].
    pub fn construct(&mut self, value: T) -> (NonNull<u8>, u32) {
        let group_idx = match self.groups.iter().position(|g| g.available_count > 0) {
            Some(idx) => idx,
            None => self.grow(),
        };
        let start = self.group_starts[group_idx];
        let (ptr, local) = unsafe { self.groups[group_idx].construct(value) };
        (ptr, start + local)
    }

    fn grow(&mut self) -> usize {
        let capacity = match self.groups.last() {
            Some(last) => last.capacity() * 2,
            None => INITIAL_HIVE_GROUP_CAPACITY,
        };
        let start = self
            .group_starts
            .last()
            .copied()
            .zip(self.groups.last())
            .map(|(start, last)| start + last.capacity() as u32)
            .unwrap_or(0);
        self.groups.push(Group::new(capacity));
        self.group_starts.push(start);
        self.groups.len() - 1
    }

    /// O(1) release; the slot is placed on its group's intrusive free list.
    /// Returns `false` on double-free or an out-of-range index.
    pub fn destruct(&mut self, index: u32) -> bool {
        match self.locate(index) {
            Some(group_idx) => {
                let local = index - self.group_starts[group_idx];
                self.groups[group_idx].destruct(local)
            }
            None => {
                debug_assert!(false, "destruct called with out-of-range hive index {index}");
                false
            }
        }
    }

    /// `None` if the slot is not currently allocated.
    pub fn get(&self, index: u32) -> Option<NonNull<u8>> {
        let group_idx = self.locate(index)?;
        let local = index - self.group_starts[group_idx];
        self.groups[group_idx].get(local)
    }

    /// Locates the group owning `index` in `O(log n_groups)` via the geometric
    /// progression of group capacities.
    fn locate(&self, index: u32) -> Option<usize> {
        let pos = self.group_starts.partition_point(|&start| start <= index);
        if pos == 0 {
            return None;
        }
        let group_idx = pos - 1;
        let local = (index - self.group_starts[group_idx]) as usize;
        (local < self.groups[group_idx].capacity()).then_some(group_idx)
    }
}

impl<T> Drop for Hive<T> {
    fn drop(&mut self) {
        for (group, &start) in self.groups.iter_mut().zip(&self.group_starts) {
            for local in 0..group.capacity() as u32 {
                if group.liveness.test(local as usize) == Ok(true) {
                    group.destruct(local);
                }
            }
            let _ = start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_then_get_returns_stable_address() {
        let mut hive: Hive<u64> = Hive::new();
        let (ptr, index) = hive.construct(42);
        let from_get = hive.get(index).unwrap();
        assert_eq!(ptr, from_get);
        assert_eq!(unsafe { *(from_get.as_ptr() as *const u64) }, 42);
    }

    #[test]
    fn destruct_frees_slot_for_reuse() {
        let mut hive: Hive<u64> = Hive::new();
        let (_, a) = hive.construct(1);
        assert!(hive.destruct(a));
        assert!(hive.get(a).is_none());
        let (_, b) = hive.construct(2);
        assert_eq!(a, b, "freed slot should be recycled before growing");
    }

    #[test]
    fn double_destruct_is_a_no_op() {
        let mut hive: Hive<u64> = Hive::new();
        let (_, a) = hive.construct(1);
        assert!(hive.destruct(a));
        assert!(!hive.destruct(a));
    }

    #[test]
    fn grows_past_first_group_capacity() {
        let mut hive: Hive<u64> = Hive::new();
        let indices: Vec<u32> = (0..(INITIAL_HIVE_GROUP_CAPACITY as u64 + 5))
            .map(|i| hive.construct(i).1)
            .collect();
        for (i, &index) in indices.iter().enumerate() {
            assert_eq!(unsafe { *(hive.get(index).unwrap().as_ptr() as *const u64) }, i as u64);
        }
    }

    #[test]
    fn get_on_out_of_range_index_is_none() {
        let hive: Hive<u64> = Hive::new();
        assert!(hive.get(0).is_none());
    }

    #[test]
    fn addresses_remain_stable_across_further_inserts() {
        let mut hive: Hive<u64> = Hive::new();
        let (ptr_a, a) = hive.construct(1);
        let _ = hive.construct(2);
        assert_eq!(hive.get(a).unwrap(), ptr_a);
    }
}
