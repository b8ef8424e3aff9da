//! RFC 2783 PPS API bindings (Linux `/dev/pps*` via `TIOCGPPS`-family
//! ioctls through `linux/timepps.h`), used to discipline the SHM/chrony
//! exports in `shm.rs`/`chrony.rs` to the kernel's own PPS capture time
//! rather than userspace's read-time jitter.
//!
//! Linux-only: the ioctl numbers below come from `linux/timepps.h` and do
//! not apply to other RFC 2783 implementations (*BSD uses the same struct
//! layout but different ioctl encoding).

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::chrony::{ChronySocket, SockSample};
use crate::shm::{ShmSegment, TimeSample};

/// `struct pps_ktime` from `linux/timepps.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PpsKtime {
    pub sec: i64,
    pub nsec: i32,
    pub flags: u32,
}

/// `struct pps_info` from `linux/timepps.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PpsInfo {
    pub assert_sequence: u32,
    pub clear_sequence: u32,
    pub assert_tu: PpsKtime,
    pub clear_tu: PpsKtime,
    pub current_mode: i32,
}

/// `struct pps_fetch_args` from `linux/timepps.h`: the ioctl request body
/// for `PPS_FETCH`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PpsFetchArgs {
    pub tsformat: i32,
    pub info: PpsInfo,
    pub timeout: PpsKtime,
}

const PPS_TSFMT_TSPEC: i32 = 1 << 0;
const PPS_CAPTUREASSERT: i32 = 1 << 0;

/// ioctl request codes from `linux/timepps.h`; `_IOWR('1', 3, struct
/// pps_fetch_args)` encoded by hand since `libc` does not expose the
/// `<linux/timepps.h>` header's macros.
const PPS_IOC_MAGIC: u32 = b'1' as u32;
const PPS_FETCH: libc::c_ulong = ioc(3, std::mem::size_of::<PpsFetchArgs>());
const PPS_SETPARAMS: libc::c_ulong = ioc(2, std::mem::size_of::<PpsFetchArgs>());

const fn ioc(nr: u32, size: usize) -> libc::c_ulong {
    // _IOC(_IOC_READ|_IOC_WRITE, magic, nr, size)
    const IOC_WRITE: u32 = 1;
    const IOC_READ: u32 = 2;
    const IOC_NRSHIFT: u32 = 0;
    const IOC_TYPESHIFT: u32 = 8;
    const IOC_SIZESHIFT: u32 = 16;
    const IOC_DIRSHIFT: u32 = 30;
    (((IOC_READ | IOC_WRITE) << IOC_DIRSHIFT)
        | (PPS_IOC_MAGIC << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

pub struct PpsHandle {
    file: File,
}

impl PpsHandle {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut args = PpsFetchArgs {
            tsformat: PPS_TSFMT_TSPEC,
            ..Default::default()
        };
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), PPS_SETPARAMS as _, &mut args) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { file })
    }

    /// Blocks (per the kernel driver's own semantics) until the next edge,
    /// then returns the full assert/clear sequence state for the caller to
    /// detect which edge actually advanced.
    pub fn fetch_info(&self, timeout: PpsKtime) -> io::Result<PpsInfo> {
        let mut args = PpsFetchArgs {
            tsformat: PPS_TSFMT_TSPEC,
            timeout,
            ..Default::default()
        };
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), PPS_FETCH as _, &mut args) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(args.info)
    }

    /// Blocks until the next edge, then returns the captured timestamp for
    /// whichever edge the driver is currently configured to capture.
    pub fn fetch(&self, timeout: PpsKtime) -> io::Result<PpsKtime> {
        let info = self.fetch_info(timeout)?;
        if info.current_mode & PPS_CAPTUREASSERT != 0 {
            Ok(info.assert_tu)
        } else {
            Ok(info.clear_tu)
        }
    }
}

/// Which bus a PPS source is wired through, fixing the precision exponent
/// SHM/chrony use to judge how much to trust the sample (RFC 2783 leaves
/// precision estimation to the implementation; gpsd's own rule of thumb is
/// -10 for USB-attached sources, -20 for a directly wired serial line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpsBus {
    Serial,
    Usb,
}

impl PpsBus {
    pub fn precision(self) -> i32 {
        match self {
            PpsBus::Serial => -20,
            PpsBus::Usb => -10,
        }
    }
}

/// One captured edge, resolved to whichever sequence counter advanced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpsCapture {
    pub real: PpsKtime,
    pub clock: PpsKtime,
    pub sequence: u32,
    pub precision: i32,
}

const FETCH_TIMEOUT: PpsKtime = PpsKtime { sec: 3, nsec: 0, flags: 0 };

/// Owns a background thread that fetches PPS edges in a loop, publishing
/// each new edge to the SHM segment and (if configured) a chrony SOCK
/// refclock, and invoking an optional hook for callers that want the raw
/// capture (tests, logging, a higher-level discipline algorithm).
pub struct PpsThread {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl PpsThread {
    pub fn spawn(
        pps_path: impl AsRef<Path>,
        bus: PpsBus,
        shm: Arc<ShmSegment>,
        chrony: Option<ChronySocket>,
        pps_hook: Option<Box<dyn Fn(&PpsCapture) + Send>>,
    ) -> io::Result<Self> {
        let pps = PpsHandle::open(pps_path)?;
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let precision = bus.precision();

        let handle = std::thread::spawn(move || {
            let mut last_assert_sequence = 0u32;
            let mut last_clear_sequence = 0u32;
            let mut first = true;

            while !worker_stop.load(Ordering::Relaxed) {
                let info = match pps.fetch_info(FETCH_TIMEOUT) {
                    Ok(info) => info,
                    Err(_) => {
                        // Timeout or transient ioctl failure; loop back and
                        // check the stop flag rather than propagating.
                        continue;
                    }
                };

                let (edge, sequence, advanced) = if info.assert_sequence != last_assert_sequence {
                    (info.assert_tu, info.assert_sequence, true)
                } else if info.clear_sequence != last_clear_sequence {
                    (info.clear_tu, info.clear_sequence, true)
                } else {
                    (info.assert_tu, info.assert_sequence, false)
                };
                last_assert_sequence = info.assert_sequence;
                last_clear_sequence = info.clear_sequence;

                if !advanced && !first {
                    continue;
                }
                first = false;

                let capture = PpsCapture { real: edge, clock: edge, sequence, precision };

                shm.write(TimeSample {
                    receiver_time_sec: capture.real.sec as i32,
                    receiver_time_nsec: capture.real.nsec,
                    clock_time_sec: capture.clock.sec as i32,
                    clock_time_nsec: capture.clock.nsec,
                    leap: 0,
                    precision,
                });

                if let Some(sock) = &chrony {
                    let sample = SockSample::new(capture.real.sec, (capture.real.nsec / 1000) as i64, 0.0, true, 0);
                    let _ = sock.send_sample(sample);
                }

                if let Some(hook) = &pps_hook {
                    hook(&capture);
                }
            }
        });

        Ok(Self { handle: Some(handle), stop })
    }

    /// Signals the worker to exit after its current fetch, then joins it.
    /// The worker's fetch has a bounded timeout (3s) so this never blocks
    /// indefinitely even if the PPS source has gone silent.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PpsThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_ioctl_code_is_readwrite_direction() {
        // _IOC_DIR bits occupy the top two bits of the 32-bit request code.
        assert_eq!((PPS_FETCH >> 30) & 0x3, 0x3);
    }

    #[test]
    fn setparams_and_fetch_use_distinct_numbers() {
        assert_ne!(PPS_FETCH, PPS_SETPARAMS);
    }

    #[test]
    fn ktime_default_is_zeroed() {
        let k = PpsKtime::default();
        assert_eq!(k.sec, 0);
        assert_eq!(k.nsec, 0);
    }

    #[test]
    fn bus_precision_matches_gpsd_convention() {
        assert_eq!(PpsBus::Usb.precision(), -10);
        assert_eq!(PpsBus::Serial.precision(), -20);
    }

    #[test]
    fn spawn_on_missing_device_fails_without_panicking() {
        let shm = Arc::new(ShmSegment::new());
        let result = PpsThread::spawn("/dev/pps-does-not-exist", PpsBus::Usb, shm, None, None);
        assert!(result.is_err());
    }
}
