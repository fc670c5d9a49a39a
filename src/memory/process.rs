//! Attaching to a running process by name
//!
//! Process discovery goes through sysinfo; reading goes through the
//! platform's native facility (`ReadProcessMemory` on Windows,
//! `/proc/<pid>/mem` on Linux for Wine/Proton hosts).

use sysinfo::System;
use tracing::debug;

use super::{Attach, MemoryError, ReadMemory};

/// Return the pids of all processes whose name matches exactly, ignoring case
pub fn find_process_ids(system: &mut System, process_name: &str) -> Vec<u32> {
    system.refresh_processes();
    let mut pids: Vec<u32> = system
        .processes()
        .iter()
        .filter(|(_, process)| process.name().eq_ignore_ascii_case(process_name))
        .map(|(pid, _)| pid.as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Attaches to the game process using the OS process table
pub struct ProcessAttacher {
    system: System,
    /// Module base assumed when the real one cannot be resolved
    fallback_base: u64,
}

impl ProcessAttacher {
    pub fn new(fallback_base: u64) -> Self {
        Self {
            system: System::new(),
            fallback_base,
        }
    }
}

impl Attach for ProcessAttacher {
    type Session = ProcessSession;

    fn attach(&mut self, process_name: &str) -> Result<ProcessSession, MemoryError> {
        let pids = find_process_ids(&mut self.system, process_name);
        let pid = *pids
            .first()
            .ok_or_else(|| MemoryError::ProcessNotFound(process_name.to_string()))?;

        if pids.len() > 1 {
            debug!(?pids, process = process_name, "multiple matching processes, using the first");
        }

        ProcessSession::open(pid, process_name, self.fallback_base)
    }
}

/// An open handle on the game process
pub struct ProcessSession {
    base: u64,
    raw: platform::RawProcess,
}

impl ProcessSession {
    pub fn open(pid: u32, process_name: &str, fallback_base: u64) -> Result<Self, MemoryError> {
        let raw = platform::RawProcess::open(pid)?;
        let base = match raw.module_base(process_name) {
            Some(base) => base,
            None => {
                debug!(pid, fallback = %format!("{:#x}", fallback_base), "module base unresolved");
                fallback_base
            }
        };

        debug!(pid, base = %format!("{:#x}", base), process = process_name, "process opened");

        Ok(Self { base, raw })
    }
}

impl ReadMemory for ProcessSession {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.raw.read(address, buf)
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::c_void;

    use windows::Win32::Foundation::{CloseHandle, HANDLE, HMODULE};
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows::Win32::System::ProcessStatus::EnumProcessModules;
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    use crate::memory::MemoryError;

    pub(super) struct RawProcess {
        handle: HANDLE,
    }

    // The handle is only ever passed to ReadProcessMemory and CloseHandle.
    unsafe impl Send for RawProcess {}

    impl RawProcess {
        pub(super) fn open(pid: u32) -> Result<Self, MemoryError> {
            let handle = unsafe {
                OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid)
            }
            .map_err(|e| MemoryError::AttachFailed {
                pid,
                reason: format!("{} (try running as Administrator)", e),
            })?;

            Ok(Self { handle })
        }

        /// The first module reported for a process is its executable
        pub(super) fn module_base(&self, _process_name: &str) -> Option<u64> {
            let mut module = HMODULE::default();
            let mut needed = 0u32;
            unsafe {
                EnumProcessModules(
                    self.handle,
                    &mut module,
                    std::mem::size_of::<HMODULE>() as u32,
                    &mut needed,
                )
            }
            .ok()?;

            Some(module.0 as usize as u64)
        }

        pub(super) fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
            let mut bytes_read = 0usize;
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as usize as *const c_void,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len(),
                    Some(&mut bytes_read),
                )
            }
            .map_err(|e| MemoryError::ReadFailed {
                address,
                len: buf.len(),
                reason: e.to_string(),
            })?;

            if bytes_read != buf.len() {
                return Err(MemoryError::ReadFailed {
                    address,
                    len: buf.len(),
                    reason: format!("short read of {} bytes", bytes_read),
                });
            }

            Ok(())
        }
    }

    impl Drop for RawProcess {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs::File;
    use std::os::unix::fs::FileExt;

    use crate::memory::MemoryError;

    pub(super) struct RawProcess {
        pid: u32,
        mem: File,
    }

    impl RawProcess {
        pub(super) fn open(pid: u32) -> Result<Self, MemoryError> {
            let mem = File::open(format!("/proc/{}/mem", pid)).map_err(|e| {
                MemoryError::AttachFailed {
                    pid,
                    reason: e.to_string(),
                }
            })?;

            Ok(Self { pid, mem })
        }

        pub(super) fn module_base(&self, process_name: &str) -> Option<u64> {
            let maps = std::fs::read_to_string(format!("/proc/{}/maps", self.pid)).ok()?;
            parse_module_base(&maps, process_name)
        }

        pub(super) fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
            self.mem
                .read_exact_at(buf, address)
                .map_err(|e| MemoryError::ReadFailed {
                    address,
                    len: buf.len(),
                    reason: e.to_string(),
                })
        }
    }

    /// Start address of the first mapping backed by the named executable
    pub(super) fn parse_module_base(maps: &str, process_name: &str) -> Option<u64> {
        let suffix = format!("/{}", process_name.to_ascii_lowercase());

        maps.lines()
            .find(|line| line.trim_end().to_ascii_lowercase().ends_with(&suffix))
            .and_then(|line| line.split('-').next())
            .and_then(|start| u64::from_str_radix(start, 16).ok())
    }

}

#[cfg(not(any(windows, target_os = "linux")))]
mod platform {
    use crate::memory::MemoryError;

    pub(super) struct RawProcess;

    impl RawProcess {
        pub(super) fn open(_pid: u32) -> Result<Self, MemoryError> {
            Err(MemoryError::Unsupported)
        }

        pub(super) fn module_base(&self, _process_name: &str) -> Option<u64> {
            None
        }

        pub(super) fn read(&self, _address: u64, _buf: &mut [u8]) -> Result<(), MemoryError> {
            Err(MemoryError::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_to_missing_process() {
        let mut attacher = ProcessAttacher::new(0x0040_0000);
        let result = attacher.attach("definitely-not-running-radio-mirror.exe");
        assert_eq!(
            result.err(),
            Some(MemoryError::ProcessNotFound(
                "definitely-not-running-radio-mirror.exe".to_string()
            ))
        );
    }
}
