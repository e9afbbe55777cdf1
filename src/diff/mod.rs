//! Structural diff engine
//!
//! Compares two values through their [`Comparable`] shapes and reports every
//! point at which they differ as a `(path, expected, actual)` triple. The
//! report is empty exactly when the two values are deeply equal, which is
//! what the harness uses to decide pass/fail.
//!
//! Paths start at `$`; map keys and record fields append `.key`, sequence
//! elements append `[index]`.

mod comparable;

pub use comparable::{Comparable, Record, Scalar, Shape};

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

/// Path of the compared roots
const ROOT: &str = "$";

/// Placeholder for the side on which a key does not exist
const MISSING: &str = "<missing>";

/// Kind of divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Two leaves of the same type with different values
    Value,
    /// Key present in expected, absent in actual
    MissingKey,
    /// Key present in actual, absent in expected
    ExtraKey,
    /// Sequences of different length
    Length,
    /// The two sides have different shapes or leaf types
    TypeMismatch,
}

impl fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::MissingKey => write!(f, "missing key"),
            Self::ExtraKey => write!(f, "extra key"),
            Self::Length => write!(f, "length"),
            Self::TypeMismatch => write!(f, "type mismatch"),
        }
    }
}

/// One point of mismatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub kind: DivergenceKind,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, actual {} ({})",
            self.path, self.expected, self.actual, self.kind
        )
    }
}

/// Ordered list of divergences between two structures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DivergenceReport {
    entries: Vec<Divergence>,
}

impl DivergenceReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Divergence] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Divergence> {
        self.entries.iter()
    }

    /// Log every divergence under `label`
    pub fn log(&self, label: &str) {
        if self.is_empty() {
            tracing::debug!(label, "No divergence");
            return;
        }
        for entry in &self.entries {
            tracing::warn!(
                label,
                path = %entry.path,
                expected = %entry.expected,
                actual = %entry.actual,
                kind = %entry.kind,
                "Divergence"
            );
        }
    }

    fn push(&mut self, path: &str, expected: String, actual: String, kind: DivergenceKind) {
        self.entries.push(Divergence {
            path: path.to_string(),
            expected,
            actual,
            kind,
        });
    }
}

impl fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no divergence");
        }
        write!(f, "{} divergence(s):", self.entries.len())?;
        for entry in &self.entries {
            write!(f, "\n  {entry}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DivergenceReport {
    type Item = &'a Divergence;
    type IntoIter = std::slice::Iter<'a, Divergence>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Compare `expected` against `actual`
///
/// Never fails: values of incompatible shape produce a type mismatch entry.
/// Neither input is modified.
pub fn diff<E, A>(expected: &E, actual: &A) -> DivergenceReport
where
    E: Comparable + ?Sized,
    A: Comparable + ?Sized,
{
    let mut report = DivergenceReport::default();
    walk(ROOT, expected.shape(), actual.shape(), &mut report);
    report
}

/// Compare two values and log the result under `label`
pub fn find_diff<E, A>(label: &str, expected: &E, actual: &A) -> DivergenceReport
where
    E: Comparable + ?Sized,
    A: Comparable + ?Sized,
{
    let report = diff(expected, actual);
    report.log(label);
    report
}

fn walk(path: &str, expected: Shape<'_>, actual: Shape<'_>, report: &mut DivergenceReport) {
    match (expected, actual) {
        (Shape::Map(expected), Shape::Map(actual)) => {
            let actual_by_key: HashMap<&str, &dyn Comparable> =
                actual.iter().map(|(key, value)| (&**key, *value)).collect();
            let expected_keys: HashSet<&str> = expected.iter().map(|(key, _)| &**key).collect();

            for (key, value) in &expected {
                if !actual_by_key.contains_key(&**key) {
                    report.push(
                        &child_key(path, key),
                        value.shape().summary(),
                        MISSING.to_string(),
                        DivergenceKind::MissingKey,
                    );
                }
            }
            for (key, value) in &actual {
                if !expected_keys.contains(&**key) {
                    report.push(
                        &child_key(path, key),
                        MISSING.to_string(),
                        value.shape().summary(),
                        DivergenceKind::ExtraKey,
                    );
                }
            }
            for (key, value) in &expected {
                if let Some(other) = actual_by_key.get(&**key) {
                    walk(&child_key(path, key), value.shape(), other.shape(), report);
                }
            }
        }
        (Shape::Seq(expected), Shape::Seq(actual)) => {
            if expected.len() != actual.len() {
                report.push(
                    path,
                    format!("{} items", expected.len()),
                    format!("{} items", actual.len()),
                    DivergenceKind::Length,
                );
                return;
            }
            for (index, (left, right)) in expected.iter().zip(actual.iter()).enumerate() {
                walk(&format!("{path}[{index}]"), left.shape(), right.shape(), report);
            }
        }
        (Shape::Leaf(expected), Shape::Leaf(actual)) => {
            if !expected.same_kind(&actual) {
                report.push(
                    path,
                    format!("{} ({})", expected, expected.kind()),
                    format!("{} ({})", actual, actual.kind()),
                    DivergenceKind::TypeMismatch,
                );
            } else if expected != actual {
                report.push(
                    path,
                    expected.to_string(),
                    actual.to_string(),
                    DivergenceKind::Value,
                );
            }
        }
        (expected, actual) => {
            report.push(
                path,
                format!("{} {}", expected.kind(), expected.summary()),
                format!("{} {}", actual.kind(), actual.summary()),
                DivergenceKind::TypeMismatch,
            );
        }
    }
}

fn child_key(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}
