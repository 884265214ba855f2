#![doc = include_str!("../README.md")]

pub use crate::codec::EventEncoder;
pub use crate::config::*;
pub use crate::error::Error;
pub use crate::filter::{Filter, Predicate, DUPLICATES_COUNT_FIELD, DUPLICATES_SUPPRESSED};
pub use crate::flatten::{
    flatten, FieldValue, FlatFields, Flattened, Flattener, Record, ScalarValue, ValueKind,
};
pub use crate::sink::{debug_line, CaptureSink, Sink, WriterSink};
pub use crate::types::*;

pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod flatten;
pub mod sink;
pub mod types;
