use std::{net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::poller::link::TagAddress;

/// How the poll loop reacts to a [`LinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The link is gone or never came up; reconnect after the backoff.
    Connection,
    /// One read failed but the link may still be usable.
    TransientRead,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect to PLC at {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to PLC at {address} timed out after {timeout:?}")]
    ConnectTimeout {
        address: SocketAddr,
        timeout: Duration,
    },

    #[error("PLC link lost: {0}")]
    Disconnected(String),

    #[error("reading {tag} timed out after {timeout:?}")]
    ReadTimeout { tag: TagAddress, timeout: Duration },

    #[error("PLC rejected read of {tag}: {reason}")]
    Rejected { tag: TagAddress, reason: String },

    #[error("PLC returned no value for {0}")]
    EmptyResponse(TagAddress),
}

impl LinkError {
    pub fn kind(&self) -> FaultKind {
        match self {
            LinkError::Connect { .. }
            | LinkError::ConnectTimeout { .. }
            | LinkError::Disconnected(_) => FaultKind::Connection,
            LinkError::ReadTimeout { .. }
            | LinkError::Rejected { .. }
            | LinkError::EmptyResponse(_) => FaultKind::TransientRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_are_classified() {
        let tag = TagAddress::Coil(2);
        assert_eq!(
            LinkError::Disconnected("broken pipe".into()).kind(),
            FaultKind::Connection
        );
        assert_eq!(
            LinkError::ReadTimeout {
                tag,
                timeout: Duration::from_secs(2)
            }
            .kind(),
            FaultKind::TransientRead
        );
        assert_eq!(LinkError::EmptyResponse(tag).kind(), FaultKind::TransientRead);
    }
}
