//! Process memory access
//!
//! Locates the game process by name and reads raw values out of its
//! address space. Platform specifics live in `process`.

mod process;

#[cfg(windows)]
pub use process::find_process_ids;
pub use process::ProcessAttacher;

/// Errors raised while attaching to or reading from the game process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("process {0} is not running")]
    ProcessNotFound(String),

    #[error("failed to attach to process {pid}: {reason}")]
    AttachFailed { pid: u32, reason: String },

    #[error("failed to read {len} bytes at {address:#x}: {reason}")]
    ReadFailed {
        address: u64,
        len: usize,
        reason: String,
    },

    #[cfg_attr(any(windows, target_os = "linux"), allow(dead_code))]
    #[error("process memory access is not supported on this platform")]
    Unsupported,
}

/// Read access to an attached process
pub trait ReadMemory: Send {
    /// Load address of the main module
    fn base_address(&self) -> u64;

    /// Fill `buf` with the bytes at `address`
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError>;

    fn read_u8(&self, address: u64) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.read_bytes(address, &mut buf)?;
        Ok(buf[0])
    }

    fn read_i32(&self, address: u64) -> Result<i32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read_bytes(address, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }
}

/// Finds and opens a process by name
pub trait Attach: Send {
    type Session: ReadMemory;

    fn attach(&mut self, process_name: &str) -> Result<Self::Session, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bytes(Vec<u8>);

    impl ReadMemory for Bytes {
        fn base_address(&self) -> u64 {
            0
        }

        fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
            let start = address as usize;
            let end = start + buf.len();
            if end > self.0.len() {
                return Err(MemoryError::ReadFailed {
                    address,
                    len: buf.len(),
                    reason: "out of range".to_string(),
                });
            }
            buf.copy_from_slice(&self.0[start..end]);
            Ok(())
        }
    }

    #[test]
    fn test_read_i32_little_endian() {
        let memory = Bytes(vec![0xFF, 0x01, 0x00, 0x00, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(memory.read_i32(0).unwrap(), 0x1FF);
        assert_eq!(memory.read_i32(4).unwrap(), -2);
    }

    #[test]
    fn test_read_u8() {
        let memory = Bytes(vec![0, 12, 13]);
        assert_eq!(memory.read_u8(1).unwrap(), 12);
    }

    #[test]
    fn test_read_out_of_range() {
        let memory = Bytes(vec![0, 1]);
        let err = memory.read_i32(0).unwrap_err();
        assert!(matches!(err, MemoryError::ReadFailed { len: 4, .. }));
    }
}
