use protocol::ProtocolError;
use thiserror::Error;

/// A fault that ends the stepping loop.
///
/// Client transport faults never surface here: the owning session absorbs
/// them and simply drops out of the round. Everything else is fatal and
/// maps to a process exit status.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("error communicating with SUMO: {0}")]
    EngineTransport(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl HubError {
    /// The exit status this fault maps to: 1 for engine-side faults, 2 for
    /// client-side faults.
    pub fn exit_status(&self) -> i32 {
        match self {
            HubError::EngineTransport(_) => 1,
            HubError::Protocol(err) if err.is_from_client() => 2,
            HubError::Protocol(_) => 1,
        }
    }
}
