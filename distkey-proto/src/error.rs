//! Protocol error surface and the per-call round log.
use distkey_group::GroupError;
use distkey_net::{ChannelError, RbcError};
use std::fmt;
use thiserror::Error;

/// Protocol failures are values. A corrupted party never makes a protocol
/// run fail on its own; it gets excluded and the round continues. The
/// variants below are the cases where the run as a whole cannot proceed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad parameter: {0}")]
    BadParameter(&'static str),
    #[error("value is not in the group")]
    NotInGroup,
    #[error("proof verification failed for party {0}")]
    BadProof(usize),
    #[error("channel failure: {0}")]
    BadChannel(String),
    #[error("round timed out")]
    Timeout,
    #[error("only {qualified} qualified dealers remain, {required} required")]
    Unqualified { qualified: usize, required: usize },
    #[error("{got} valid shares collected, {need} needed")]
    NotEnoughShares { got: usize, need: usize },
    #[error("protocol aborted: {0}")]
    Abort(&'static str),
}

impl From<ChannelError> for ProtocolError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Timeout => ProtocolError::Timeout,
            other => ProtocolError::BadChannel(other.to_string()),
        }
    }
}

impl From<RbcError> for ProtocolError {
    fn from(e: RbcError) -> Self {
        match e {
            RbcError::Timeout | RbcError::Channel(ChannelError::Timeout) => ProtocolError::Timeout,
            other => ProtocolError::BadChannel(other.to_string()),
        }
    }
}

impl From<GroupError> for ProtocolError {
    fn from(e: GroupError) -> Self {
        match e {
            GroupError::NotInGroup => ProtocolError::NotInGroup,
            GroupError::BadParameter(msg) => ProtocolError::BadParameter(msg),
            GroupError::InvalidCrs(msg) => ProtocolError::BadParameter(msg),
        }
    }
}

/// Human-readable per-call transcript. Every protocol round appends what
/// it observed, in particular which party got excluded and why; the
/// return value of the call stays a plain success/failure.
#[derive(Debug, Default)]
pub struct RoundLog {
    lines: Vec<String>,
}

impl RoundLog {
    pub fn new() -> Self {
        RoundLog::default()
    }

    pub fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("{}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for RoundLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
