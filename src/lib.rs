//!
//! Runtime core of an archetype-based ECS: a process-wide component type
//! registry, an archetype registry that canonicalizes sorted component-type sets
//! and solves their chunk layout, a packed entity identity scheme and a
//! segmented stable-address pool.
//!
//! Out of scope: the entity-to-archetype store, query planning/scheduling and
//! change detection, serialization, and any host-language CLI or build glue.
//!

pub mod archetype;
pub mod bitset;
pub mod component;
pub mod constants;
pub mod entity;
pub mod entity_pool;
pub mod error;
pub mod hash;
pub mod hive;
pub mod type_registry;

pub use self::{
    archetype::{ArchetypeDescriptor, ArchetypeRegistry, ComponentGroup, ComponentInfo as ArchetypeComponentInfo},
    component::{Component, ComponentClassification, ComponentVtable, FieldInfo, TypeDescriptor, TypeDescriptorBuilder, TypeHash},
    entity::Entity,
    entity_pool::EntityPool,
    error::{ErrorCode, Result},
    hive::Hive,
    type_registry::TypeRegistry,
};
