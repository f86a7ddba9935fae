//! Archetype descriptors: canonical, sorted component-type sets with their
//! component-group layout solved against the chunk size.

mod layout;
mod registry;

pub use layout::{ChunkLayoutError, ComponentGroup, HEADER_SIZE};
pub use registry::{ArchetypeRegistry, PositionMap};

use smallvec::SmallVec;

use crate::component::{ComponentClassification, TypeDescriptor};
use crate::error::ErrorCode;
use crate::hash::hash_bytes;

/// Per-component runtime info recorded inside an [`ArchetypeDescriptor`].
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {
    pub idx_in_archetype: u32,
    pub idx_in_group: u32,
    pub group_idx: u32,
    pub chunk_offset: u32,
}

impl ComponentInfo {
    const INVALID: u32 = crate::constants::INVALID_INDEX;

    fn provisional(idx_in_archetype: u32) -> Self {
        ComponentInfo {
            idx_in_archetype,
            idx_in_group: Self::INVALID,
            group_idx: Self::INVALID,
            chunk_offset: 0,
        }
    }
}

/// Pure data: a canonical, sorted set of component types, its group layout and the
/// solved chunk offsets. Built exclusively by [`ArchetypeRegistry`]; there is no
/// public mutation after construction.
#[derive(Debug)]
pub struct ArchetypeDescriptor {
    hash: u32,
    component_types: Box<[TypeDescriptor]>,
    components: Box<[ComponentInfo]>,
    groups: Box<[ComponentGroup]>,
}

impl ArchetypeDescriptor {
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn component_types(&self) -> &[TypeDescriptor] {
        &self.component_types
    }

    pub fn components(&self) -> &[ComponentInfo] {
        &self.components
    }

    pub fn groups(&self) -> &[ComponentGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.component_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.component_types.is_empty()
    }

    /// Position of `type_hash` among `component_types`, if present.
    pub fn index_of(&self, type_hash: crate::component::TypeHash) -> Option<usize> {
        self.component_types
            .binary_search_by_key(&type_hash, |t| t.hash())
            .ok()
    }

    /// Step 1-2 of `initialize`: validate, stable-sort and hash `types`, without
    /// running the layout solver. Split out so the registry can check its index
    /// for a cache hit on `hash` before paying for the layout solve.
    fn canonicalize(mut types: Vec<TypeDescriptor>) -> Result<(u32, Vec<TypeDescriptor>), ErrorCode> {
        if types.is_empty() || types.iter().any(|t| t.classification() == ComponentClassification::None) {
            return Err(ErrorCode::InvalidArchetype);
        }

        types.sort_by_key(|t| t.hash());
        let hash = archetype_hash(&types);
        Ok((hash, types))
    }

    /// Step 3 of `initialize`: runs the layout solver over already-canonicalized
    /// `types` and builds the descriptor.
    fn from_sorted(hash: u32, types: Vec<TypeDescriptor>) -> Result<Self, ErrorCode> {
        let mut components: Vec<ComponentInfo> =
            types.iter().enumerate().map(|(i, _)| ComponentInfo::provisional(i as u32)).collect();

        let groups = layout::solve(&types, &mut components)?;

        Ok(ArchetypeDescriptor {
            hash,
            component_types: types.into_boxed_slice(),
            components: components.into_boxed_slice(),
            groups,
        })
    }

    #[cfg(test)]
    fn build(types: Vec<TypeDescriptor>) -> Result<Self, ErrorCode> {
        let (hash, types) = Self::canonicalize(types)?;
        Self::from_sorted(hash, types)
    }
}

/// `Murmur3(concat(sorted TypeHashes))`, hashed over the raw byte representation of
/// the hash sequence (mirroring `hash_memory` over `type_hash_t` arrays in the
/// original archetype system, for bit-compatibility) rather than hashing each `u64`
/// independently.
fn archetype_hash(sorted_types: &[TypeDescriptor]) -> u32 {
    let mut bytes: SmallVec<[u8; 64]> = SmallVec::with_capacity(sorted_types.len() * 8);
    for t in sorted_types {
        bytes.extend_from_slice(&t.hash().to_be_bytes());
    }
    hash_bytes(&bytes)
}
