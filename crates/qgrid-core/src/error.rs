//! Error types for qgrid

use thiserror::Error;

use crate::offset::RationalOffset;

#[derive(Debug, Error)]
pub enum QuantizeError {
    #[error("Invalid pitch: {0}")]
    InvalidPitch(String),
    #[error("Invalid offset: {0}")]
    InvalidOffset(RationalOffset),
    #[error("Proxy offset {0} is outside 0..=1")]
    ProxyOffsetOutOfRange(RationalOffset),
    #[error("Event at {offset} lies outside span {start}..={end}")]
    EventOutsideSpan {
        offset: RationalOffset,
        start: RationalOffset,
        end: RationalOffset,
    },
    #[error("Empty span: {start}..={end}")]
    EmptySpan {
        start: RationalOffset,
        end: RationalOffset,
    },
    #[error("Invalid event sequence: {0}")]
    InvalidSequence(String),
    #[error("Invalid search tree definition: {0}")]
    InvalidDefinition(String),
    #[error("Invalid subdivision ratios: {0:?}")]
    InvalidRatios(Vec<u32>),
    #[error("Leaf index {index} out of range ({count} subdividable leaves)")]
    LeafIndexOutOfRange { index: usize, count: usize },
    #[error("Node {0} is not a leaf")]
    NotALeaf(usize),
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(String),
    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },
    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, QuantizeError>;
