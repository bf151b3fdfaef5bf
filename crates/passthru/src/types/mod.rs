//! Payloads of managed heap objects.
//!
//! Each type owns `Value`s that may reference other heap entries; those
//! references are handed back to the heap through `take_children` when the
//! owning entry is freed.

pub(crate) mod container;
pub(crate) mod dict;
pub(crate) mod instance;
pub(crate) mod list;

pub(crate) use container::Container;
pub(crate) use dict::Dict;
pub(crate) use instance::Instance;
pub(crate) use list::{List, Tuple};

/// Builtin managed type of a value.
///
/// Class instances report their own class name instead, see `Value::type_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "dict")]
    Dict,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "tuple")]
    Tuple,
    /// The managed side of the handle container.
    #[strum(serialize = "PassThruContainer")]
    Container,
    /// A user class instance; the concrete name lives on the instance.
    #[strum(serialize = "instance")]
    Instance,
}

impl Type {
    /// Whether managed `hash()` is defined for values of this type.
    #[must_use]
    pub fn is_hashable(self) -> bool {
        !matches!(self, Self::Dict | Self::List)
    }
}
