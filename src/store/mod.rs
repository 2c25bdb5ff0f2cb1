//! Match result sinks

pub mod ratings;
pub mod remote;
pub mod sink;

pub use ratings::{PlayerStats, RatingLedger};
pub use remote::HttpResultSink;
pub use sink::{MatchResult, ResultSink, SinkError};
