use std::fmt;

use ndarray::ArrayD;

use crate::coords::Coord;

/// The computed values of a `DataArray`, held in memory along with its labels.
///
#[derive(Clone, Debug)]
pub struct Materialized {
    pub name: String,
    pub long_name: String,
    pub units: String,
    pub title: Option<String>,
    pub coords: Vec<Coord>,
    pub values: ArrayD<f64>,
}

impl Materialized {
    pub fn dims(&self) -> Vec<&str> {
        self.coords.iter().map(|coord| coord.name.as_str()).collect()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    pub fn coord(&self, dim: &str) -> Option<&Coord> {
        self.coords.iter().find(|coord| coord.name == dim)
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_units<S: Into<String>>(mut self, units: S) -> Self {
        self.units = units.into();
        self
    }

    /// Title for display: the explicit title if one was set, otherwise the long name.
    pub fn display_title(&self) -> &str {
        match &self.title {
            Some(title) => title,
            None if !self.long_name.is_empty() => &self.long_name,
            None => &self.name,
        }
    }

    /// Smallest and largest values present, or `None` if every value is missing.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .fold(None, |range, value| match range {
                None => Some((value, value)),
                Some((low, high)) => Some((low.min(value), high.max(value))),
            })
    }

    pub fn count_missing(&self) -> usize {
        self.values.iter().filter(|value| value.is_nan()).count()
    }
}

impl fmt::Display for Materialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .coords
            .iter()
            .map(|coord| format!("{}: {}", coord.name, coord.len()))
            .collect();
        write!(f, "{} ({})", self.name, dims.join(", "))?;
        if let Some((low, high)) = self.finite_range() {
            write!(f, " range {low:.3} to {high:.3}")?;
        }
        if !self.units.is_empty() {
            write!(f, " {}", self.units)?;
        }

        Ok(())
    }
}
