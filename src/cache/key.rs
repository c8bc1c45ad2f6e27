//! Key Module
//!
//! Scalar key components and the compound keys built from them.

use std::fmt;
use std::num::TryFromIntError;

use serde::{Deserialize, Serialize};

// == Key Part ==
/// One scalar component of a compound key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// An ordered sequence of key parts, root first.
pub type Key = Vec<KeyPart>;

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

macro_rules! int_key_part {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(i: $ty) -> Self {
                    KeyPart::Int(i64::from(i))
                }
            }
        )*
    };
}

int_key_part!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_key_part {
    ($($ty:ty),*) => {
        $(
            /// Fails for ids above `i64::MAX`.
            impl TryFrom<$ty> for KeyPart {
                type Error = TryFromIntError;

                fn try_from(i: $ty) -> Result<Self, Self::Error> {
                    i64::try_from(i).map(KeyPart::Int)
                }
            }
        )*
    };
}

wide_int_key_part!(u64, usize, i128, u128);

// == Display Key ==
/// Renders a key as `(a, 1, true)` for logs and error messages.
pub fn display_key(key: &[KeyPart]) -> String {
    let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

// == Key Macro ==
/// Builds a [`Key`] from literals and expressions convertible to [`KeyPart`].
///
/// `u64` and `usize` ids go through `KeyPart::try_from` first, since not
/// every value fits a key part.
///
/// ```
/// use compound_cache::{key, KeyPart};
///
/// let k = key!["tenant", 42, true];
/// assert_eq!(k[1], KeyPart::Int(42));
///
/// let id: u64 = 7;
/// let k = key!["user", KeyPart::try_from(id).unwrap()];
/// assert_eq!(k[1], KeyPart::Int(7));
/// ```
#[macro_export]
macro_rules! key {
    () => {
        ::std::vec::Vec::<$crate::KeyPart>::new()
    };
    ($($part:expr),+ $(,)?) => {
        ::std::vec![$($crate::KeyPart::from($part)),+]
    };
}
