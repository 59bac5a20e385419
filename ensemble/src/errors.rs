use std::io;
use std::result;

use cid::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    IO(#[from] io::Error),

    #[error("invalid CID: {0}")]
    Cid(#[from] cid::Error),

    #[error("object not found in store: {0}")]
    NotFound(Cid),

    #[error("unrecognized object format: {0}")]
    Format(String),

    #[error("cache load failed")]
    Load,

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("no catalog entry named {0:?}")]
    Lookup(String),

    #[error("no variable named {0:?}")]
    BadName(String),

    #[error("no dimension named {0:?}")]
    BadDimension(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("empty selection: {0}")]
    EmptySelection(String),

    #[error("unsupported resampling frequency: {0:?}")]
    Frequency(String),

    #[error("timestamp out of range: {0}")]
    Time(i64),

    #[error("could not provision worker pool: {0}")]
    Provision(String),

    #[error("task failed: {0}")]
    Task(String),
}

pub type Result<T> = result::Result<T, Error>;
