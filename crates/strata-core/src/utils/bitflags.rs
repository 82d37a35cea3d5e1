// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A macro to declare typed bitflag sets without pulling in an external crate.

/// Declares a `Copy` bitflag set backed by an unsigned integer.
///
/// The generated type exposes one associated constant per flag, an `EMPTY`
/// and an `ALL` set, the usual set algebra and a `Debug` impl that prints the
/// flag names, e.g. `DescriptorKinds { READ_VIEW | WRITE_VIEW }`.
#[macro_export]
#[doc(hidden)]
macro_rules! strata_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// The set containing no flag.
            pub const EMPTY: Self = Self { bits: 0 };

            /// The set containing every declared flag.
            pub const ALL: Self = Self { bits: 0 $(| $flag_value)* };

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            /// Builds a set from raw bits, dropping bits that match no declared flag.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits: bits & Self::ALL.bits }
            }

            /// Builds a set from raw bits, or `None` if an undeclared bit is set.
            pub const fn from_bits(bits: $ty) -> Option<Self> {
                if bits & !Self::ALL.bits == 0 {
                    Some(Self { bits })
                } else {
                    None
                }
            }

            /// Returns the raw bits of the set.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` if no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if every flag of `other` is set in `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if `self` and `other` share at least one flag.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Sets the flags of `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Clears the flags of `other`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Returns a copy of `self` with the flags of `other` set.
            #[must_use]
            pub const fn with(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }

            /// Returns a copy of `self` with the flags of `other` cleared.
            #[must_use]
            pub const fn without(self, other: Self) -> Self {
                Self { bits: self.bits & !other.bits }
            }
        }

        impl ::core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl ::core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl ::core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl ::core::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, other: Self) {
                self.bits &= other.bits;
            }
        }

        impl ::core::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self { bits: !self.bits & Self::ALL.bits }
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                let mut remaining = self.bits;
                let mut first = true;
                write!(f, "{} {{ ", stringify!($name))?;
                $(
                    if $flag_value != 0 && (remaining & $flag_value) == $flag_value {
                        if !first {
                            write!(f, " | ")?;
                        }
                        write!(f, "{}", stringify!($flag_name))?;
                        remaining &= !$flag_value;
                        first = false;
                    }
                )*
                if remaining != 0 {
                    if !first {
                        write!(f, " | ")?;
                    }
                    write!(f, "UNKNOWN({:#x})", remaining)?;
                    first = false;
                }
                if first {
                    write!(f, "EMPTY")?;
                }
                write!(f, " }}")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::strata_bitflags;

    strata_bitflags! {
        /// Flags used only by these tests.
        pub struct Access: u8 {
            const READ = 1 << 0;
            const WRITE = 1 << 1;
            const ATOMIC = 1 << 2;
        }
    }

    #[test]
    fn empty_set_prints_empty() {
        assert!(Access::EMPTY.is_empty());
        assert_eq!(Access::default(), Access::EMPTY);
        assert_eq!(format!("{:?}", Access::EMPTY), "Access { EMPTY }");
    }

    #[test]
    fn all_is_union_of_declared_flags() {
        assert_eq!(Access::ALL.bits(), 0b111);
        assert!(Access::ALL.contains(Access::READ | Access::ATOMIC));
    }

    #[test]
    fn from_bits_rejects_unknown_bits() {
        assert_eq!(Access::from_bits(0b011), Some(Access::READ | Access::WRITE));
        assert_eq!(Access::from_bits(0b1000), None);
        assert_eq!(Access::from_bits_truncate(0b1001), Access::READ);
    }

    #[test]
    fn set_algebra() {
        let mut access = Access::READ;
        access.insert(Access::WRITE);
        assert!(access.contains(Access::WRITE));
        assert!(access.intersects(Access::READ | Access::ATOMIC));
        access.remove(Access::READ);
        assert_eq!(access, Access::WRITE);
        assert_eq!(!Access::WRITE, Access::READ | Access::ATOMIC);
        assert_eq!(Access::READ.with(Access::ATOMIC).without(Access::READ), Access::ATOMIC);
    }

    #[test]
    fn debug_lists_flag_names() {
        let access = Access::READ | Access::ATOMIC;
        assert_eq!(format!("{:?}", access), "Access { READ | ATOMIC }");
    }
}
