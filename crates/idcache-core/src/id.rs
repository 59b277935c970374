//! Record identifiers.
//!
//! A record is identified by an ordered sequence of scalar values. Most models
//! use a single integer primary key, but composite keys are supported.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scalar component of an identifier or of a key discriminator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ScalarValue {
    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Appends the unambiguous key encoding of this scalar to `out`.
    ///
    /// Strings are length-prefixed so that separator characters inside a
    /// string can never make two different scalars render the same.
    pub(crate) fn write_key_part(&self, out: &mut String) {
        match self {
            Self::Bool(v) => out.push_str(if *v { "b1" } else { "b0" }),
            Self::Int(v) => {
                out.push('i');
                out.push_str(&v.to_string());
            },
            Self::Str(v) => {
                out.push('s');
                out.push_str(&v.len().to_string());
                out.push('#');
                out.push_str(v);
            },
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Identifier of a record: an ordered sequence of scalars.
///
/// # Examples
///
/// ```
/// use idcache_core::RecordId;
///
/// let simple = RecordId::from(42);
/// assert_eq!(simple.to_string(), "42");
///
/// let composite = RecordId::composite([1.into(), "en".into()]);
/// assert_eq!(composite.to_string(), "1/en");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Vec<ScalarValue>);

impl RecordId {
    /// Creates an identifier from its ordered parts.
    pub fn composite(parts: impl IntoIterator<Item = ScalarValue>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// Returns the ordered parts.
    pub fn parts(&self) -> &[ScalarValue] {
        &self.0
    }

    /// Returns the single integer part of a simple integer id.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0.as_slice() {
            [single] => single.as_i64(),
            _ => None,
        }
    }

    pub(crate) fn write_key_part(&self, out: &mut String) {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('/');
            }
            part.write_key_part(out);
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

macro_rules! record_id_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RecordId {
                fn from(value: $ty) -> Self {
                    Self(vec![ScalarValue::from(value)])
                }
            }
        )*
    };
}

record_id_from!(i64, i32, u32, bool, &str, String);

impl From<ScalarValue> for RecordId {
    fn from(value: ScalarValue) -> Self {
        Self(vec![value])
    }
}
