use std::ops::Range;

use crate::time;

/// Values along one dimension of an array.
///
#[derive(Clone, Debug, PartialEq)]
pub enum CoordValues {
    /// Seconds since the Unix epoch
    Time(Vec<i64>),
    Float(Vec<f64>),
    Int(Vec<i64>),

    /// Categorical labels, such as season names
    Label(Vec<String>),
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::Time(values) => values.len(),
            CoordValues::Float(values) => values.len(),
            CoordValues::Int(values) => values.len(),
            CoordValues::Label(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        match self {
            CoordValues::Time(values) => CoordValues::Time(values[range].to_vec()),
            CoordValues::Float(values) => CoordValues::Float(values[range].to_vec()),
            CoordValues::Int(values) => CoordValues::Int(values[range].to_vec()),
            CoordValues::Label(values) => CoordValues::Label(values[range].to_vec()),
        }
    }

    /// Human readable label for the value at `index`
    pub fn label(&self, index: usize) -> String {
        match self {
            CoordValues::Time(values) => match time::date(values[index]) {
                Ok(date) => date.format("%Y-%m-%d").to_string(),
                Err(_) => values[index].to_string(),
            },
            CoordValues::Float(values) => format!("{:.3}", values[index]),
            CoordValues::Int(values) => values[index].to_string(),
            CoordValues::Label(values) => values[index].clone(),
        }
    }

    /// Numeric position of each value on an axis. Labels are placed at their index.
    pub fn positions(&self) -> Vec<f64> {
        match self {
            CoordValues::Time(values) => values.iter().map(|&value| value as f64).collect(),
            CoordValues::Float(values) => values.clone(),
            CoordValues::Int(values) => values.iter().map(|&value| value as f64).collect(),
            CoordValues::Label(values) => (0..values.len()).map(|index| index as f64).collect(),
        }
    }

    pub fn labels(&self) -> Option<&[String]> {
        match self {
            CoordValues::Label(values) => Some(values),
            _ => None,
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self, CoordValues::Time(_))
    }
}

/// A named coordinate
///
#[derive(Clone, Debug, PartialEq)]
pub struct Coord {
    pub name: String,
    pub values: CoordValues,
}

impl Coord {
    pub fn new<S: Into<String>>(name: S, values: CoordValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> Self {
        Self {
            name: self.name.clone(),
            values: self.values.slice(range),
        }
    }
}
