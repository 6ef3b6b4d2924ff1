//! protocol: wire-level pieces of the TraCI command protocol.
//!
//! Commands are composed in and drained out of [`Storage`] buffers; every
//! command starts with the two-form size prefix implemented in [`framing`].

pub mod error;
pub mod framing;
pub mod storage;

pub use error::{Origin, ProtocolError};
pub use storage::{Storage, StorageError};

/// Simulation step request (and the opcode of its status response).
pub const CMD_SIMSTEP2: u8 = 0x02;

/// Connection close request.
pub const CMD_CLOSE: u8 = 0x7F;

/// Status result code: success.
pub const RTYPE_OK: u8 = 0x00;

/// Status result code: the peer does not implement the command.
pub const RTYPE_NOT_IMPLEMENTED: u8 = 0x01;

/// Status result code: failure.
pub const RTYPE_ERR: u8 = 0xFF;
