//! Flag sets shared by observers, bindings and the router.
//!
//! [`LifecycleFlags`] travel with every change notification so that a
//! subscriber can tell whether the change originates from binding, unbinding
//! or disposal, and how it should be propagated.

use bitflags::bitflags;

bitflags! {
    /// Flags passed along with change notifications and lifecycle calls.
    ///
    /// The bit layout groups persistent binding flags (kept on a binding after
    /// `bind` so later mutation callbacks see them) in the high nibble.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFlags: u32 {
        /// Flags that are stored on a binding during `bind`.
        const PERSISTENT_BINDING_FLAGS        = 0b1111_000_00_1;
        const ALLOW_PARENT_SCOPE_TRAVERSAL    = 0b0001_000_00_0;
        const OBSERVE_LEAF_PROPERTIES_ONLY    = 0b0010_000_00_0;
        const TARGET_OBSERVER_FLAGS           = 0b1100_000_00_1;
        const NO_FLUSH                        = 0b0100_000_00_0;
        const PERSISTENT_TARGET_OBSERVER_QUEUE = 0b1000_000_00_0;
        const BINDING_STRATEGY                = 0b0000_000_00_1;
        const IS_STRICT_BINDING_STRATEGY      = 0b0000_000_00_1;
        const FROM_BIND                       = 0b0000_000_01_0;
        const FROM_UNBIND                     = 0b0000_000_10_0;
        const MUST_EVALUATE                   = 0b0000_001_00_0;
        const IS_TRAVERSING_PARENT_SCOPE      = 0b0000_010_00_0;
        const DISPOSE                         = 0b0000_100_00_0;
    }
}

impl LifecycleFlags {
    /// No flags set.
    pub const NONE: Self = Self::empty();

    /// Keep only the flags that survive past `bind`.
    pub fn persistent(self) -> Self {
        self & Self::PERSISTENT_BINDING_FLAGS
    }
}

bitflags! {
    /// Direction(s) in which a binding propagates values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingMode: u8 {
        const ONE_TIME  = 0b0001;
        const TO_VIEW   = 0b0010;
        const FROM_VIEW = 0b0100;
        const TWO_WAY   = 0b0110;
        const DEFAULT   = 0b1000;
    }
}

bitflags! {
    /// Characteristics of an accessor or observer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessorType: u16 {
        const OBSERVER  = 0b0_0000_0001;
        const NODE      = 0b0_0000_0010;
        /// Updates may trigger heavy recomputation and should be queued.
        const LAYOUT    = 0b0_0000_0100;
        const PRIMITIVE = 0b0_0000_1000;
        const ARRAY     = 0b0_0001_0010;
        const SET       = 0b0_0010_0010;
        const MAP       = 0b0_0100_0010;
    }
}

/// The shape of an observed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// An index-addressed list.
    Array,
    /// A keyed collection of unique values.
    Set,
    /// A keyed collection of key/value pairs.
    Map,
}

impl CollectionKind {
    /// Whether items are addressed by position.
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Array)
    }

    /// Whether items are addressed by key.
    pub fn is_keyed(self) -> bool {
        !self.is_indexed()
    }

    /// The accessor type reported by observers of this kind.
    pub fn accessor_type(self) -> AccessorType {
        match self {
            Self::Array => AccessorType::ARRAY,
            Self::Set => AccessorType::SET,
            Self::Map => AccessorType::MAP,
        }
    }

    /// The name of the property that holds the collection's length.
    pub fn length_property(self) -> &'static str {
        match self {
            Self::Array => "length",
            Self::Set | Self::Map => "size",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_flags_strip_transient_bits() {
        let flags = LifecycleFlags::FROM_BIND | LifecycleFlags::NO_FLUSH;
        assert_eq!(flags.persistent(), LifecycleFlags::NO_FLUSH);
        assert_eq!(LifecycleFlags::NONE.persistent(), LifecycleFlags::NONE);
    }

    #[test]
    fn test_two_way_contains_both_directions() {
        assert!(BindingMode::TWO_WAY.contains(BindingMode::TO_VIEW));
        assert!(BindingMode::TWO_WAY.contains(BindingMode::FROM_VIEW));
        assert!(!BindingMode::TWO_WAY.contains(BindingMode::ONE_TIME));
    }

    #[test]
    fn test_collection_kind() {
        assert!(CollectionKind::Array.is_indexed());
        assert!(CollectionKind::Map.is_keyed());
        assert_eq!(CollectionKind::Set.length_property(), "size");
        assert!(CollectionKind::Map.accessor_type().contains(AccessorType::NODE));
    }
}
