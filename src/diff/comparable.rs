//! The "comparable fields" capability
//!
//! Every value the diff engine walks exposes itself as one of three shapes:
//! a mapping of named fields, an ordered sequence, or a scalar leaf. Records
//! expose their fields as a mapping, so the engine never needs to know the
//! concrete type it is comparing.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Structural view of a comparable value
pub enum Shape<'a> {
    /// Named fields or map entries, in a stable order
    Map(Vec<(Cow<'a, str>, &'a dyn Comparable)>),
    /// Ordered elements
    Seq(Vec<&'a dyn Comparable>),
    /// A scalar value
    Leaf(Scalar<'a>),
}

impl Shape<'_> {
    /// Short name of the shape used in type mismatch reports
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Map(_) => "map",
            Shape::Seq(_) => "sequence",
            Shape::Leaf(scalar) => scalar.kind(),
        }
    }

    /// Compact rendering used as the expected/actual text of a divergence
    pub fn summary(&self) -> String {
        match self {
            Shape::Map(fields) => format!("{{{} keys}}", fields.len()),
            Shape::Seq(items) => format!("[{} items]", items.len()),
            Shape::Leaf(scalar) => scalar.to_string(),
        }
    }
}

/// A scalar leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar<'a> {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(Cow<'a, str>),
}

impl Scalar<'_> {
    /// Type name of the scalar
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
        }
    }

    /// Whether two scalars have the same type
    pub fn same_kind(&self, other: &Scalar<'_>) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Capability to expose comparable structure to the diff engine
///
/// Implementations must agree with `PartialEq` where the type has one: two
/// values are equal exactly when their shapes are recursively equal.
pub trait Comparable {
    fn shape(&self) -> Shape<'_>;
}

macro_rules! int_leaf {
    ($($t:ty),*) => {
        $(impl Comparable for $t {
            fn shape(&self) -> Shape<'_> {
                Shape::Leaf(Scalar::Int(i128::from(*self)))
            }
        })*
    };
}

int_leaf!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Comparable for usize {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf(Scalar::Int(*self as i128))
    }
}

impl Comparable for f64 {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf(Scalar::Float(*self))
    }
}

impl Comparable for bool {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf(Scalar::Bool(*self))
    }
}

impl Comparable for str {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf(Scalar::Str(Cow::Borrowed(self)))
    }
}

impl Comparable for String {
    fn shape(&self) -> Shape<'_> {
        self.as_str().shape()
    }
}

impl Comparable for Path {
    fn shape(&self) -> Shape<'_> {
        Shape::Leaf(Scalar::Str(self.to_string_lossy()))
    }
}

impl Comparable for PathBuf {
    fn shape(&self) -> Shape<'_> {
        self.as_path().shape()
    }
}

impl<T: Comparable> Comparable for Option<T> {
    fn shape(&self) -> Shape<'_> {
        match self {
            Some(value) => value.shape(),
            None => Shape::Leaf(Scalar::Null),
        }
    }
}

impl<T: Comparable + ?Sized> Comparable for Box<T> {
    fn shape(&self) -> Shape<'_> {
        (**self).shape()
    }
}

impl<T: Comparable> Comparable for [T] {
    fn shape(&self) -> Shape<'_> {
        Shape::Seq(self.iter().map(|item| item as &dyn Comparable).collect())
    }
}

impl<T: Comparable> Comparable for Vec<T> {
    fn shape(&self) -> Shape<'_> {
        self.as_slice().shape()
    }
}

impl<T: Comparable> Comparable for BTreeMap<String, T> {
    fn shape(&self) -> Shape<'_> {
        Shape::Map(
            self.iter()
                .map(|(key, value)| (Cow::Borrowed(key.as_str()), value as &dyn Comparable))
                .collect(),
        )
    }
}

impl<T: Comparable, S> Comparable for HashMap<String, T, S> {
    fn shape(&self) -> Shape<'_> {
        let mut fields: Vec<_> = self
            .iter()
            .map(|(key, value)| (Cow::Borrowed(key.as_str()), value as &dyn Comparable))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Shape::Map(fields)
    }
}

impl Comparable for serde_json::Value {
    fn shape(&self) -> Shape<'_> {
        use serde_json::Value;
        match self {
            Value::Null => Shape::Leaf(Scalar::Null),
            Value::Bool(b) => Shape::Leaf(Scalar::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Shape::Leaf(Scalar::Int(i128::from(i)))
                } else if let Some(u) = n.as_u64() {
                    Shape::Leaf(Scalar::Int(i128::from(u)))
                } else {
                    Shape::Leaf(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Value::String(s) => s.shape(),
            Value::Array(items) => items.shape(),
            Value::Object(map) => Shape::Map(
                map.iter()
                    .map(|(key, value)| (Cow::Borrowed(key.as_str()), value as &dyn Comparable))
                    .collect(),
            ),
        }
    }
}

/// Builder for the mapping shape of a record type
///
/// ```
/// use harness::diff::{Comparable, Record, Shape};
///
/// struct Point { x: i64, y: i64 }
///
/// impl Comparable for Point {
///     fn shape(&self) -> Shape<'_> {
///         Record::new().field("x", &self.x).field("y", &self.y).build()
///     }
/// }
/// ```
#[derive(Default)]
pub struct Record<'a> {
    fields: Vec<(Cow<'a, str>, &'a dyn Comparable)>,
}

impl<'a> Record<'a> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Add a named field
    pub fn field(mut self, name: &'static str, value: &'a dyn Comparable) -> Self {
        self.fields.push((Cow::Borrowed(name), value));
        self
    }

    pub fn build(self) -> Shape<'a> {
        Shape::Map(self.fields)
    }
}
