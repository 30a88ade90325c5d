//! Handles and tagged values.

use std::fmt;

/// Stable handle to a collectable object in the heap arena.
///
/// The generation distinguishes a live object from a later occupant of the
/// same slot, so a handle that outlived its object is detected rather than
/// silently aliasing a new one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef {
    index: u32,
    generation: u32,
}

impl GcRef {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Handle to an interned string, carrying the cached content hash.
///
/// Two `StrRef`s are equal exactly when they name the same interned
/// object, which for live strings means equal content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef {
    gc: GcRef,
    hash: u32,
}

impl StrRef {
    pub(crate) const fn new(gc: GcRef, hash: u32) -> Self {
        Self { gc, hash }
    }

    /// The underlying object handle.
    #[must_use]
    pub const fn gc(self) -> GcRef {
        self.gc
    }

    /// Content hash, as computed by [`hash_bytes`](crate::string::hash_bytes).
    #[must_use]
    pub const fn hash(self) -> u32 {
        self.hash
    }
}

impl fmt::Debug for StrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "str{:?}", self.gc)
    }
}

/// Basic type of a value. Used to index the per-type metatables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Nil = 0,
    Boolean = 1,
    LightUserdata = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    Userdata = 7,
    Thread = 8,
}

impl TypeTag {
    /// Number of basic types.
    pub const COUNT: usize = 9;

    /// Position in a per-type array.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A runtime value. Collectable variants hold handles, not the objects.
///
/// Equality is raw equality: numbers compare numerically (so `NaN` is never
/// equal to itself) and collectables compare by identity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    /// An opaque host pointer; not collectable.
    LightUserdata(usize),
    String(StrRef),
    Table(GcRef),
    Function(GcRef),
    Userdata(GcRef),
    Thread(GcRef),
}

impl Value {
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Handle of the referenced object, if the value is collectable.
    #[must_use]
    pub const fn gc(&self) -> Option<GcRef> {
        match *self {
            Self::String(s) => Some(s.gc()),
            Self::Table(r) | Self::Function(r) | Self::Userdata(r) | Self::Thread(r) => Some(r),
            Self::Nil | Self::Boolean(_) | Self::Number(_) | Self::LightUserdata(_) => None,
        }
    }

    #[must_use]
    pub const fn is_collectable(&self) -> bool {
        self.gc().is_some()
    }

    #[must_use]
    pub const fn type_tag(&self) -> TypeTag {
        match self {
            Self::Nil => TypeTag::Nil,
            Self::Boolean(_) => TypeTag::Boolean,
            Self::Number(_) => TypeTag::Number,
            Self::LightUserdata(_) => TypeTag::LightUserdata,
            Self::String(_) => TypeTag::String,
            Self::Table(_) => TypeTag::Table,
            Self::Function(_) => TypeTag::Function,
            Self::Userdata(_) => TypeTag::Userdata,
            Self::Thread(_) => TypeTag::Thread,
        }
    }

    /// The number, if this is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match *self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The table handle, if this is a table.
    #[must_use]
    pub const fn as_table(&self) -> Option<GcRef> {
        match *self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    /// The string handle, if this is a string.
    #[must_use]
    pub const fn as_str(&self) -> Option<StrRef> {
        match *self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<StrRef> for Value {
    fn from(s: StrRef) -> Self {
        Self::String(s)
    }
}
