//! Single-lock canonicalizing registry of [`ArchetypeDescriptor`]s.

use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::component::{TypeDescriptor, TypeHash};
use crate::error::ErrorCode;

use super::ArchetypeDescriptor;

/// Maps each extra component passed to [`ArchetypeRegistry::include`] to its index
/// in the resulting archetype, so the store can place the new component values
/// without a second lookup.
pub type PositionMap = SmallVec<[(TypeHash, usize); 4]>;

/// Canonicalizes component-type sets into shared [`ArchetypeDescriptor`]s.
///
/// The registry holds only a [`Weak`] back-reference per archetype; callers (the
/// store, or a composite-archetype lookup) hold the strong [`Arc`] that keeps an
/// archetype alive. An archetype with no strong holders silently disappears from
/// the index — `get`/`get_or_create` then rebuild it on next demand.
#[derive(Default)]
pub struct ArchetypeRegistry {
    by_hash: Mutex<HashMap<u32, Weak<ArchetypeDescriptor>>>,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        ArchetypeRegistry { by_hash: Mutex::new(HashMap::new()) }
    }

    /// Canonicalizes `types`, checks the weak index under `hash` before doing
    /// anything else, and only runs the layout solver on a genuine miss.
    pub fn get_or_create(&self, types: Vec<TypeDescriptor>) -> Result<Arc<ArchetypeDescriptor>, ErrorCode> {
        let (hash, types) = ArchetypeDescriptor::canonicalize(types)?;

        if let Some(existing) = self.get(hash) {
            log::trace!("archetype {hash:#x} cache hit");
            return Ok(existing);
        }

        let descriptor = Arc::new(ArchetypeDescriptor::from_sorted(hash, types)?);
        let mut map = self.by_hash.lock();
        match map.get(&hash).and_then(Weak::upgrade) {
            Some(winner) => Ok(winner),
            None => {
                log::debug!("archetype {hash:#x} registered ({} components)", descriptor.len());
                map.insert(hash, Arc::downgrade(&descriptor));
                Ok(descriptor)
            }
        }
    }

    /// Weak-index lookup; `None` if absent or the archetype has no strong holders
    /// left.
    pub fn get(&self, hash: u32) -> Option<Arc<ArchetypeDescriptor>> {
        self.by_hash.lock().get(&hash).and_then(Weak::upgrade)
    }

    /// Sorted merge of `archetype`'s component types with `extras`, de-duplicated by
    /// [`TypeHash`] (an extra already present is a no-op), followed by
    /// [`ArchetypeRegistry::get_or_create`] on the merge.
    pub fn include(
        &self,
        archetype: &ArchetypeDescriptor,
        extras: &[TypeDescriptor],
    ) -> Result<(Arc<ArchetypeDescriptor>, PositionMap), ErrorCode> {
        let merged = merge_types(archetype, extras);
        if merged.len() == archetype.len() {
            log::trace!("include on archetype {:#x}: all extras already present", archetype.hash());
        }
        let result = self.get_or_create(merged)?;
        Ok((result.clone(), extra_positions(&result, extras)))
    }

    /// Set-difference of `archetype`'s component types by `removals`' [`TypeHash`]es
    /// (removals not present are tolerated), followed by
    /// [`ArchetypeRegistry::get_or_create`] on the remainder. `None` if the
    /// remainder is empty — a zero-component archetype is not representable.
    pub fn exclude(
        &self,
        archetype: &ArchetypeDescriptor,
        removals: &[TypeHash],
    ) -> Result<Option<Arc<ArchetypeDescriptor>>, ErrorCode> {
        match remainder_types(archetype, removals) {
            None => {
                log::trace!("exclude on archetype {:#x} would leave no components", archetype.hash());
                Ok(None)
            }
            Some(remainder) => self.get_or_create(remainder).map(Some),
        }
    }

    pub fn len(&self) -> usize {
        self.by_hash.lock().len()
    }
}

fn merge_types(archetype: &ArchetypeDescriptor, extras: &[TypeDescriptor]) -> Vec<TypeDescriptor> {
    let mut merged: Vec<TypeDescriptor> = archetype.component_types().to_vec();
    for extra in extras {
        if !merged.iter().any(|t| t.hash() == extra.hash()) {
            merged.push(extra.clone());
        }
    }
    merged
}

fn extra_positions(result: &ArchetypeDescriptor, extras: &[TypeDescriptor]) -> PositionMap {
    extras
        .iter()
        .filter_map(|extra| result.index_of(extra.hash()).map(|idx| (extra.hash(), idx)))
        .collect()
}

fn remainder_types(archetype: &ArchetypeDescriptor, removals: &[TypeHash]) -> Option<Vec<TypeDescriptor>> {
    let remainder: Vec<TypeDescriptor> =
        archetype.component_types().iter().filter(|t| !removals.contains(&t.hash())).cloned().collect();
    (!remainder.is_empty()).then_some(remainder)
}

#[cfg(feature = "async")]
pub use cooperative::*;

#[cfg(feature = "async")]
mod cooperative {
    use super::*;
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll};

    /// Cooperative variants of [`ArchetypeRegistry::get_or_create`]/`include`/`exclude`:
    /// same canonicalize-then-check-then-solve order, the lock acquired across
    /// `.await` suspension points via `try_lock` retry rather than blocking.
    impl ArchetypeRegistry {
        pub fn async_get_or_create(&self, types: Vec<TypeDescriptor>) -> AsyncGetOrCreate<'_> {
            AsyncGetOrCreate { registry: self, pending: Some(types) }
        }

        pub async fn async_include(
            &self,
            archetype: &ArchetypeDescriptor,
            extras: &[TypeDescriptor],
        ) -> Result<(Arc<ArchetypeDescriptor>, PositionMap), ErrorCode> {
            let merged = merge_types(archetype, extras);
            let result = self.async_get_or_create(merged).await?;
            let positions = extra_positions(&result, extras);
            Ok((result, positions))
        }

        pub async fn async_exclude(
            &self,
            archetype: &ArchetypeDescriptor,
            removals: &[TypeHash],
        ) -> Result<Option<Arc<ArchetypeDescriptor>>, ErrorCode> {
            match remainder_types(archetype, removals) {
                None => Ok(None),
                Some(remainder) => self.async_get_or_create(remainder).await.map(Some),
            }
        }
    }

    pub struct AsyncGetOrCreate<'a> {
        registry: &'a ArchetypeRegistry,
        pending: Option<Vec<TypeDescriptor>>,
    }

    impl<'a> Future for AsyncGetOrCreate<'a> {
        type Output = Result<Arc<ArchetypeDescriptor>, ErrorCode>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let types = self.pending.take().expect("AsyncGetOrCreate polled after completion");
            let (hash, types) = match ArchetypeDescriptor::canonicalize(types) {
                Ok(pair) => pair,
                Err(err) => return Poll::Ready(Err(err)),
            };

            match self.registry.by_hash.try_lock() {
                Some(mut map) => {
                    if let Some(existing) = map.get(&hash).and_then(Weak::upgrade) {
                        log::trace!("archetype {hash:#x} cache hit (async)");
                        return Poll::Ready(Ok(existing));
                    }
                    let descriptor = match ArchetypeDescriptor::from_sorted(hash, types) {
                        Ok(d) => Arc::new(d),
                        Err(err) => return Poll::Ready(Err(err)),
                    };
                    log::debug!("archetype {hash:#x} registered (async)");
                    map.insert(hash, Arc::downgrade(&descriptor));
                    Poll::Ready(Ok(descriptor))
                }
                None => {
                    self.pending = Some(types);
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::TypeDescriptorBuilder;

    fn leaf(name: &str) -> TypeDescriptor {
        TypeDescriptorBuilder::new(name, 8, 4).finalize().unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent_by_hash() {
        let registry = ArchetypeRegistry::new();
        let a = registry.get_or_create(vec![leaf("Position"), leaf("Velocity")]).unwrap();
        let b = registry.get_or_create(vec![leaf("Velocity"), leaf("Position")]).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_returns_none_when_unregistered() {
        let registry = ArchetypeRegistry::new();
        assert!(registry.get(0xdead_beef).is_none());
    }

    #[test]
    fn get_returns_none_after_last_strong_ref_drops() {
        let registry = ArchetypeRegistry::new();
        let a = registry.get_or_create(vec![leaf("Position")]).unwrap();
        let hash = a.hash();
        drop(a);
        assert!(registry.get(hash).is_none());
    }

    #[test]
    fn include_adds_and_deduplicates() {
        let registry = ArchetypeRegistry::new();
        let base = registry.get_or_create(vec![leaf("Position")]).unwrap();
        let (with_velocity, positions) =
            registry.include(&base, &[leaf("Velocity"), leaf("Position")]).unwrap();
        assert_eq!(with_velocity.len(), 2);
        assert_eq!(positions.len(), 1);
    }

    #[test]
    fn exclude_removes_and_tolerates_missing() {
        let registry = ArchetypeRegistry::new();
        let base = registry.get_or_create(vec![leaf("Position"), leaf("Velocity")]).unwrap();
        let remainder = registry
            .exclude(&base, &[leaf("Velocity").hash(), leaf("Mass").hash()])
            .unwrap()
            .unwrap();
        assert_eq!(remainder.len(), 1);
    }

    #[test]
    fn exclude_to_empty_returns_none() {
        let registry = ArchetypeRegistry::new();
        let base = registry.get_or_create(vec![leaf("Position")]).unwrap();
        let result = registry.exclude(&base, &[leaf("Position").hash()]).unwrap();
        assert!(result.is_none());
    }
}
