//! Process-wide catalog of [`TypeDescriptor`]s keyed by `name_hash`.

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::component::{Component, TypeDescriptor, TypeDescriptorBuilder, TypeHash};
use crate::hash::hash_bytes;

/// Single-lock catalog of registered component type descriptors, mirroring
/// `runtime_type_system_impl`'s incumbent-wins `register_type_info`.
#[derive(Default)]
pub struct TypeRegistry {
    by_name_hash: Mutex<HashMap<u32, TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry { by_name_hash: Mutex::new(HashMap::new()) }
    }

    /// `None` on miss, never an `Err`.
    pub fn get(&self, name: &str) -> Option<TypeDescriptor> {
        self.get_by_hash(hash_bytes(name.as_bytes()))
    }

    pub fn get_by_hash(&self, name_hash: u32) -> Option<TypeDescriptor> {
        self.by_name_hash.lock().get(&name_hash).cloned()
    }

    /// Atomic "insert if absent" on `descriptor`'s `name_hash`. Incumbent wins on a
    /// hash conflict: `descriptor` is discarded and the incumbent returned instead.
    pub fn register(&self, descriptor: TypeDescriptor) -> TypeDescriptor {
        let name_hash = descriptor.hash().name_hash();
        let mut map = self.by_name_hash.lock();
        match map.get(&name_hash) {
            Some(incumbent) => {
                if incumbent.hash() != descriptor.hash() {
                    log::warn!("type {name_hash:#x} hash conflict, keeping incumbent");
                }
                incumbent.clone()
            }
            None => {
                map.insert(name_hash, descriptor.clone());
                descriptor
            }
        }
    }

    /// Looks up `T::type_name()`; on miss, recursively registers each field's type
    /// first (so nested composite fields land in the registry too), then builds and
    /// registers `T` itself.
    pub fn get_or_create<T: Component>(&self) -> TypeDescriptor {
        let name = T::type_name();
        if let Some(existing) = self.get(name) {
            log::trace!("type {name} cache hit");
            return existing;
        }

        let mut builder = TypeDescriptorBuilder::new(
            name,
            core::mem::size_of::<T>() as u32,
            core::mem::align_of::<T>() as u32,
        )
        .vtable(T::vtable())
        .classification(T::classification())
        .group_id(T::group_id());

        for &(register_field, offset, size, alignment) in T::fields() {
            let field = register_field(self);
            builder = builder.set_field(field.hash(), offset, size, alignment);
        }

        let descriptor = builder.finalize().expect("Component impl produced an invalid field layout");
        log::debug!("type {name} registered");
        self.register(descriptor)
    }

    pub fn len(&self) -> usize {
        self.by_name_hash.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(feature = "async")]
pub use cooperative::*;

#[cfg(feature = "async")]
mod cooperative {
    use super::*;
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll};

    /// Same semantics as [`TypeRegistry::get_by_hash`]/[`TypeRegistry::register`];
    /// retries `try_lock` and registers the waker on contention rather than blocking.
    impl TypeRegistry {
        pub fn async_get_by_hash(&self, name_hash: u32) -> AsyncLookup<'_> {
            AsyncLookup { registry: self, name_hash }
        }

        pub fn async_register(&self, descriptor: TypeDescriptor) -> AsyncRegister<'_> {
            AsyncRegister { registry: self, descriptor: Some(descriptor) }
        }
    }

    pub struct AsyncLookup<'a> {
        registry: &'a TypeRegistry,
        name_hash: u32,
    }

    impl<'a> Future for AsyncLookup<'a> {
        type Output = Option<TypeDescriptor>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            match self.registry.by_name_hash.try_lock() {
                Some(map) => Poll::Ready(map.get(&self.name_hash).cloned()),
                None => {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }
    }

    pub struct AsyncRegister<'a> {
        registry: &'a TypeRegistry,
        descriptor: Option<TypeDescriptor>,
    }

    impl<'a> Future for AsyncRegister<'a> {
        type Output = TypeDescriptor;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let descriptor = self.descriptor.take().expect("AsyncRegister polled after completion");
            let name_hash = descriptor.hash().name_hash();
            match self.registry.by_name_hash.try_lock() {
                Some(mut map) => Poll::Ready(match map.get(&name_hash) {
                    Some(incumbent) => incumbent.clone(),
                    None => {
                        map.insert(name_hash, descriptor.clone());
                        descriptor
                    }
                }),
                None => {
                    self.descriptor = Some(descriptor);
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
    use crate::component::ComponentClassification;

    fn leaf(name: &str) -> TypeDescriptor {
        TypeDescriptorBuilder::new(name, 4, 4).finalize().unwrap()
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = TypeRegistry::new();
        let installed = registry.register(leaf("Position"));
        let found = registry.get("Position").unwrap();
        assert_eq!(found.hash(), installed.hash());
    }

    #[test]
    fn get_by_hash_matches_get_by_name() {
        let registry = TypeRegistry::new();
        let installed = registry.register(leaf("Velocity"));
        let by_hash = registry.get_by_hash(installed.hash().name_hash()).unwrap();
        assert_eq!(by_hash.hash(), installed.hash());
    }

    #[test]
    fn get_on_unknown_name_returns_none() {
        let registry = TypeRegistry::new();
        assert!(registry.get("Nonexistent").is_none());
    }

    #[test]
    fn register_is_incumbent_wins_on_same_key() {
        let registry = TypeRegistry::new();
        let first = registry.register(leaf("Position"));
        let second = registry.register(
            TypeDescriptorBuilder::new("Position", 4, 4)
                .classification(ComponentClassification::CopyOnWrite)
                .finalize()
                .unwrap(),
        );
        assert_eq!(first.hash(), second.hash());
        assert_eq!(registry.get("Position").unwrap().classification(), first.classification());
    }

    #[test]
    fn len_reflects_distinct_names() {
        let registry = TypeRegistry::new();
        registry.register(leaf("A"));
        registry.register(leaf("B"));
        assert_eq!(registry.len(), 2);
    }

    struct Inner(u32);

    impl Component for Inner {
        fn type_name() -> &'static str {
            "type_registry::tests::Inner"
        }
    }

    struct Outer {
        inner: Inner,
    }

    fn register_inner(registry: &TypeRegistry) -> TypeDescriptor {
        registry.get_or_create::<Inner>()
    }

    impl Component for Outer {
        fn type_name() -> &'static str {
            "type_registry::tests::Outer"
        }

        fn fields() -> &'static [(fn(&TypeRegistry) -> TypeDescriptor, u32, u32, u32)] {
            &[(register_inner, 0, 4, 4)]
        }
    }

    #[test]
    fn get_or_create_recursively_registers_field_types() {
        let registry = TypeRegistry::new();
        assert!(registry.get("type_registry::tests::Inner").is_none());

        let outer = registry.get_or_create::<Outer>();

        let inner = registry.get("type_registry::tests::Inner").unwrap();
        assert_eq!(outer.fields().len(), 1);
        assert_eq!(outer.fields()[0].field_type, inner.hash());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = TypeRegistry::new();
        let first = registry.get_or_create::<Outer>();
        let second = registry.get_or_create::<Outer>();
        assert_eq!(first.hash(), second.hash());
        assert_eq!(registry.len(), 2);
    }
}
