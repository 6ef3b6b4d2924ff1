use std::fmt;

use thiserror::Error;

/// Which peer produced the malformed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Engine,
    Client,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Engine => "SUMO",
            Origin::Client => "client",
        })
    }
}

/// A structural error in a message, attributed to the peer that produced
/// it and the port it arrived through. The origin is plain data; callers
/// branch on it when mapping faults to exit codes.
#[derive(Debug, Error)]
#[error("{message} (on {origin} through port {port})")]
pub struct ProtocolError {
    pub message: String,
    pub port: u16,
    pub origin: Origin,
}

impl ProtocolError {
    pub fn engine(message: impl Into<String>, port: u16) -> Self {
        Self {
            message: message.into(),
            port,
            origin: Origin::Engine,
        }
    }

    pub fn client(message: impl Into<String>, port: u16) -> Self {
        Self {
            message: message.into(),
            port,
            origin: Origin::Client,
        }
    }

    pub fn is_from_client(&self) -> bool {
        self.origin == Origin::Client
    }
}
