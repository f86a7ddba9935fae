//! Component type reflection: [`TypeHash`], [`TypeDescriptor`] and the `Component`
//! trait that drives descriptor construction from the host type system.

use core::{
    any::type_name,
    fmt::{self, Display},
    ptr::{self, NonNull},
};

use smallvec::SmallVec;

use crate::hash::hash_bytes;
use crate::type_registry::TypeRegistry;

/// Packed `name_hash`/`layout_hash`. Same `name_hash`, different `layout_hash` is a
/// hash conflict and must not shadow the incumbent in [`crate::type_registry::TypeRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TypeHash(u64);

impl TypeHash {
    #[inline]
    pub const fn compose(name_hash: u32, layout_hash: u32) -> Self {
        TypeHash((name_hash as u64) | ((layout_hash as u64) << 32))
    }

    #[inline]
    pub const fn name_hash(&self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn layout_hash(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHash")
            .field("name_hash", &self.name_hash())
            .field("layout_hash", &self.layout_hash())
            .finish()
    }
}

/// What an archetype is allowed to do with a component's bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentClassification {
    /// Not usable as a component; archetype construction must fail.
    None,
    /// Plain relocatable data.
    Data,
    /// Data that additionally requires a copy hook on structural share (e.g. to bump
    /// an external refcount) before any write.
    CopyOnWrite,
}

/// A field of a component type, as recorded by [`TypeDescriptor::finalize`].
#[derive(Clone, Copy, Debug)]
pub struct FieldInfo {
    pub field_type: TypeHash,
    pub offset: u32,
}

/// Optional lifecycle hooks over type-erased, correctly-aligned pointers.
#[derive(Clone, Copy, Default)]
pub struct ComponentVtable {
    pub construct: Option<unsafe fn(NonNull<u8>)>,
    pub destroy: Option<unsafe fn(NonNull<u8>)>,
    pub copy: Option<unsafe fn(NonNull<u8>, NonNull<u8>)>,
    pub swap: Option<unsafe fn(NonNull<u8>, NonNull<u8>)>,
    pub move_: Option<unsafe fn(NonNull<u8>, NonNull<u8>)>,
}

impl fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVtable")
            .field("construct", &self.construct.is_some())
            .field("destroy", &self.destroy.is_some())
            .field("copy", &self.copy.is_some())
            .field("swap", &self.swap.is_some())
            .field("move_", &self.move_.is_some())
            .finish()
    }
}

/// A registered component type. Built by [`TypeDescriptorBuilder`]; immutable once
/// finalized.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    name: Box<str>,
    size: u32,
    alignment: u32,
    hash: TypeHash,
    vtable: ComponentVtable,
    fields: SmallVec<[FieldInfo; 4]>,
    classification: ComponentClassification,
    group_id: u32,
}

impl TypeDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn vtable(&self) -> &ComponentVtable {
        &self.vtable
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn classification(&self) -> ComponentClassification {
        self.classification
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.name)
    }
}

/// Error returned by [`TypeDescriptorBuilder::finalize`] when a field is malformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// `offset + field_type.size` exceeds the descriptor's declared `size`.
    OutOfBounds { field_index: usize },
    /// `offset` does not satisfy `field_type`'s declared alignment.
    Misaligned { field_index: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::OutOfBounds { field_index } => {
                write!(f, "field {field_index} extends past the descriptor's declared size")
            }
            FieldError::Misaligned { field_index } => {
                write!(f, "field {field_index} offset violates its type's alignment")
            }
        }
    }
}

impl std::error::Error for FieldError {}

/// Incremental builder: set non-field properties, append fields, [`finalize`](Self::finalize).
pub struct TypeDescriptorBuilder {
    name: Box<str>,
    size: u32,
    alignment: u32,
    vtable: ComponentVtable,
    classification: ComponentClassification,
    group_id: u32,
    fields: SmallVec<[PendingField; 4]>,
}

struct PendingField {
    field_type: TypeHash,
    offset: u32,
    size: u32,
    alignment: u32,
}

impl TypeDescriptorBuilder {
    pub fn new(name: &str, size: u32, alignment: u32) -> Self {
        TypeDescriptorBuilder {
            name: name.into(),
            size,
            alignment,
            vtable: ComponentVtable::default(),
            classification: ComponentClassification::Data,
            group_id: 0,
            fields: SmallVec::new(),
        }
    }

    pub fn vtable(mut self, vtable: ComponentVtable) -> Self {
        self.vtable = vtable;
        self
    }

    pub fn classification(mut self, classification: ComponentClassification) -> Self {
        self.classification = classification;
        self
    }

    pub fn group_id(mut self, group_id: u32) -> Self {
        self.group_id = group_id;
        self
    }

    /// `field_size`/`field_alignment` validate `offset` at `finalize` time; not
    /// stored in the resulting [`FieldInfo`].
    pub fn set_field(
        mut self,
        field_type: TypeHash,
        offset: u32,
        field_size: u32,
        field_alignment: u32,
    ) -> Self {
        debug_assert!(field_alignment.is_power_of_two());
        self.fields.push(PendingField { field_type, offset, size: field_size, alignment: field_alignment });
        self
    }

    /// Validates field bounds/alignment and hashes field `TypeHash`es in order.
    pub fn finalize(self) -> Result<TypeDescriptor, FieldError> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.size > 0 && field.offset.wrapping_add(field.size) > self.size {
                return Err(FieldError::OutOfBounds { field_index: i });
            }
            if field.alignment != 0 && field.offset % field.alignment != 0 {
                return Err(FieldError::Misaligned { field_index: i });
            }
        }

        let mut layout_bytes = Vec::with_capacity(self.fields.len() * 8);
        let fields = self
            .fields
            .iter()
            .map(|field| {
                layout_bytes.extend_from_slice(&field.field_type.to_be_bytes());
                FieldInfo { field_type: field.field_type, offset: field.offset }
            })
            .collect();

        let name_hash = hash_bytes(self.name.as_bytes());
        let layout_hash = hash_bytes(&layout_bytes);

        Ok(TypeDescriptor {
            name: self.name,
            size: self.size,
            alignment: self.alignment,
            hash: TypeHash::compose(name_hash, layout_hash),
            vtable: self.vtable,
            fields,
            classification: self.classification,
            group_id: self.group_id,
        })
    }
}

/// Host-type reflection façade, generalizing the teacher's `ComponentInfo::new::<T>()`
/// into the five-entry vtable and field list the descriptor model requires.
pub trait Component: 'static + Sized {
    /// Defaults to the Rust type name; override for host-language-facing names.
    fn type_name() -> &'static str {
        type_name::<Self>()
    }

    fn classification() -> ComponentClassification {
        ComponentClassification::Data
    }

    fn group_id() -> u32 {
        0
    }

    /// Per-field `(register_in_registry, byte_offset, size, alignment)`. The first
    /// element registers the field's own type (recursively, for composite fields)
    /// and returns its descriptor. Leaf component types leave this empty.
    fn fields() -> &'static [(fn(&TypeRegistry) -> TypeDescriptor, u32, u32, u32)] {
        &[]
    }

    /// Trivial for `Default` types; override when construction needs host-specific
    /// logic the blanket impl can't express.
    fn vtable() -> ComponentVtable {
        ComponentVtable {
            construct: None,
            destroy: if core::mem::needs_drop::<Self>() { Some(erased_destroy::<Self>) } else { None },
            copy: None,
            swap: Some(erased_swap::<Self>),
            move_: Some(erased_move::<Self>),
        }
    }
}

/// Builds the `construct` vtable entry for `T: Default`. Called by host-type
/// `Component` impls that want default-construction support; the blanket
/// [`Component::vtable`] leaves `construct` null since not every component is
/// `Default`.
pub fn default_construct_fn<T: Default>() -> unsafe fn(NonNull<u8>) {
    erased_construct::<T>
}

unsafe fn erased_construct<T: Default>(ptr: NonNull<u8>) {
    ptr::write(ptr.as_ptr() as *mut T, T::default())
}

unsafe fn erased_destroy<T>(ptr: NonNull<u8>) {
    ptr::drop_in_place(ptr.as_ptr() as *mut T)
}

unsafe fn erased_swap<T>(a: NonNull<u8>, b: NonNull<u8>) {
    ptr::swap(a.as_ptr() as *mut T, b.as_ptr() as *mut T)
}

unsafe fn erased_move<T>(dst: NonNull<u8>, src: NonNull<u8>) {
    ptr::copy_nonoverlapping(src.as_ptr() as *const T, dst.as_ptr() as *mut T, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, size: u32, align: u32) -> TypeDescriptor {
        TypeDescriptorBuilder::new(name, size, align).finalize().unwrap()
    }

    #[test]
    fn leaf_descriptor_finalizes() {
        let d = leaf("Position", 8, 4);
        assert_eq!(d.size(), 8);
        assert_eq!(d.alignment(), 4);
        assert_eq!(d.fields().len(), 0);
    }

    #[test]
    fn same_name_and_layout_hash_to_the_same_type_hash() {
        let a = leaf("Position", 8, 4);
        let b = leaf("Position", 8, 4);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_names_hash_conflict_in_name_hash_only() {
        let a = leaf("Position", 8, 4);
        let b = leaf("Velocity", 8, 4);
        assert_ne!(a.hash().name_hash(), b.hash().name_hash());
    }

    #[test]
    fn field_out_of_bounds_is_rejected() {
        let field = leaf("f32", 4, 4).hash();
        let err = TypeDescriptorBuilder::new("Bad", 4, 4)
            .set_field(field, 4, 4, 4)
            .finalize()
            .unwrap_err();
        assert_eq!(err, FieldError::OutOfBounds { field_index: 0 });
    }

    #[test]
    fn misaligned_field_is_rejected() {
        let field = leaf("f32", 4, 4).hash();
        let err = TypeDescriptorBuilder::new("Bad", 16, 4)
            .set_field(field, 1, 4, 4)
            .finalize()
            .unwrap_err();
        assert_eq!(err, FieldError::Misaligned { field_index: 0 });
    }

    #[test]
    fn layout_hash_depends_on_field_order() {
        let a = leaf("f32", 4, 4).hash();
        let b = leaf("i32", 4, 4).hash();
        let ab = TypeDescriptorBuilder::new("AB", 8, 4)
            .set_field(a, 0, 4, 4)
            .set_field(b, 4, 4, 4)
            .finalize()
            .unwrap();
        let ba = TypeDescriptorBuilder::new("AB", 8, 4)
            .set_field(b, 0, 4, 4)
            .set_field(a, 4, 4, 4)
            .finalize()
            .unwrap();
        assert_ne!(ab.hash().layout_hash(), ba.hash().layout_hash());
    }

    #[test]
    fn none_classification_is_preserved() {
        let d = TypeDescriptorBuilder::new("Opaque", 0, 1)
            .classification(ComponentClassification::None)
            .finalize()
            .unwrap();
        assert_eq!(d.classification(), ComponentClassification::None);
    }
}
