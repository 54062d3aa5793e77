//! Column - one named field of a variable record

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// One time series per entity.
    Series,
    /// One float per entity.
    Float,
    /// One integer per entity.
    Int,
    /// One string per entity.
    Text,
}

impl ColumnKind {
    /// Get kind name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Float => "float",
            Self::Int => "int",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity values of one field.
///
/// Every variant is indexed by entity: element `i` describes the `i`-th
/// recorded entity of the owning variable.
///
/// Equality compares floats bitwise, so `NaN` fill values (used for the
/// pre/post indices of non-connection groups) compare equal to themselves.
#[derive(Debug, Clone)]
pub enum Column {
    /// Time series per entity (entities x samples, rows may differ in length).
    Series(Vec<Vec<f64>>),
    /// Scalar float per entity.
    Float(Vec<f64>),
    /// Scalar integer per entity.
    Int(Vec<i64>),
    /// Label per entity.
    Text(Vec<String>),
}

impl Column {
    /// Empty column of the given kind.
    #[must_use]
    pub const fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Series => Self::Series(Vec::new()),
            ColumnKind::Float => Self::Float(Vec::new()),
            ColumnKind::Int => Self::Int(Vec::new()),
            ColumnKind::Text => Self::Text(Vec::new()),
        }
    }

    /// Repeat a label `n` times.
    #[must_use]
    pub fn broadcast_text(value: &str, n: usize) -> Self {
        Self::Text(vec![value.to_string(); n])
    }

    /// Repeat a float `n` times.
    #[must_use]
    pub fn broadcast_float(value: f64, n: usize) -> Self {
        Self::Float(vec![value; n])
    }

    /// Number of entities in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Series(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// True when the column holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage kind of the column.
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        match self {
            Self::Series(_) => ColumnKind::Series,
            Self::Float(_) => ColumnKind::Float,
            Self::Int(_) => ColumnKind::Int,
            Self::Text(_) => ColumnKind::Text,
        }
    }

    /// Append `other`'s entities after this column's entities.
    ///
    /// # Errors
    /// Returns the two kinds when they differ; `self` is left untouched.
    pub fn extend(&mut self, other: Self) -> std::result::Result<(), (ColumnKind, ColumnKind)> {
        match (self, other) {
            (Self::Series(a), Self::Series(b)) => a.extend(b),
            (Self::Float(a), Self::Float(b)) => a.extend(b),
            (Self::Int(a), Self::Int(b)) => a.extend(b),
            (Self::Text(a), Self::Text(b)) => a.extend(b),
            (a, b) => return Err((a.kind(), b.kind())),
        }
        Ok(())
    }
}

fn floats_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Series(a), Self::Series(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| floats_eq(x, y))
            }
            (Self::Float(a), Self::Float(b)) => floats_eq(a, b),
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_columns_compare_equal() {
        let a = Column::broadcast_float(f64::NAN, 3);
        let b = Column::broadcast_float(f64::NAN, 3);
        assert_eq!(a, b);
        assert_ne!(a, Column::broadcast_float(f64::NAN, 2));
    }

    #[test]
    fn test_extend_preserves_order() {
        let mut col = Column::Int(vec![0, 1]);
        col.extend(Column::Int(vec![7])).unwrap();
        assert_eq!(col, Column::Int(vec![0, 1, 7]));
    }

    #[test]
    fn test_extend_kind_mismatch_leaves_column() {
        let mut col = Column::Int(vec![0, 1]);
        let err = col.extend(Column::broadcast_text("x", 1)).unwrap_err();
        assert_eq!(err, (ColumnKind::Int, ColumnKind::Text));
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn test_empty_matches_kind() {
        for kind in [
            ColumnKind::Series,
            ColumnKind::Float,
            ColumnKind::Int,
            ColumnKind::Text,
        ] {
            let col = Column::empty(kind);
            assert_eq!(col.kind(), kind);
            assert!(col.is_empty());
        }
    }
}
