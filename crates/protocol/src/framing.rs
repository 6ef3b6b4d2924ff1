//! The two-form size prefix every command starts with, and the status
//! frames both peers answer with.

use crate::storage::{Storage, StorageError};

/// Reads a command-size prefix.
///
/// A nonzero first byte is the total on-wire length of the command. A zero
/// first byte means the length did not fit in a byte and follows as an i32
/// that counts every on-wire byte, the five prefix bytes included. Either
/// way the returned size discounts the prefix, so it is the opcode plus
/// payload length.
pub fn read_command_size(storage: &mut Storage) -> Result<usize, StorageError> {
    let size = storage.read_u8()?;
    if size != 0 {
        return Ok(size as usize - 1);
    }

    let size = storage.read_i32()?;
    if size < 5 {
        return Err(StorageError::InvalidCommandSize(size));
    }
    Ok(size as usize - 5)
}

/// Writes the size prefix for a command of `size` bytes, opcode plus
/// payload. The bytes occupied by the prefix itself are accounted for
/// internally.
pub fn write_command_size(storage: &mut Storage, size: usize) {
    let size = size + 1;
    if size < 256 {
        storage.write_u8(size as u8);
    } else {
        storage.write_u8(0);
        storage.write_i32((size + 4) as i32);
    }
}

/// Writes a complete status frame: size prefix, opcode, result code and a
/// length-prefixed description.
pub fn write_status(storage: &mut Storage, opcode: u8, result: u8, description: &str) {
    write_command_size(storage, 1 + 1 + 4 + description.len());
    storage.write_u8(opcode);
    storage.write_u8(result);
    storage.write_string(description);
}
