//! Tagged references into actor-owned collections.
//!
//! Payloads never hold references to actors. They carry a small copyable id
//! that the owning model resolves against its own storage (a `Vec` index or
//! a map key), which keeps ownership of every actor inside its model.

/// Declare a copyable id newtype over `u64` with a display prefix.
///
/// # Example
///
/// ```
/// queuesim_core::sim_id!(
///     /// A skier on the mountain.
///     SkierId, "skier"
/// );
///
/// let id = SkierId::new(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(id.to_string(), "skier-3");
/// ```
#[macro_export]
macro_rules! sim_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new id.
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw id value.
            pub fn as_u64(&self) -> u64 {
                self.0
            }

            /// The id as a collection index.
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}
