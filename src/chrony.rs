//! `chronyd`'s SOCK refclock protocol: a `sendto` of a fixed-size sample
//! struct over a Unix domain datagram socket, used as the PPS time-export
//! path when chrony rather than ntpd is the local time daemon.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;

/// Mirrors chrony's `struct sock_sample` wire layout (see chrony's
/// `refclock_sock.c`): an LP64 `struct timeval` (`tv_sec`/`tv_usec` both
/// `long`, 8 bytes apiece), an offset, a pulse flag, a leap indicator, and
/// a reserved pad word, 40 bytes total (§6) -- chrony reads this with a
/// raw `recvfrom` into the struct, so the field widths must match its
/// LP64 layout exactly, not just carry the same information.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SockSample {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub offset: f64,
    pub pulse: i32,
    pub leap: i32,
    pub _pad: i32,
    pub magic: i32,
}

const SOCK_MAGIC: i32 = 0x534F434B; // "SOCK"

impl SockSample {
    pub fn new(tv_sec: i64, tv_usec: i64, offset: f64, pulse: bool, leap: i32) -> Self {
        Self {
            tv_sec,
            tv_usec,
            offset,
            pulse: pulse as i32,
            leap,
            _pad: 0,
            magic: SOCK_MAGIC,
        }
    }

    fn to_wire(self) -> [u8; 40] {
        let mut buf = [0u8; 40];
        buf[0..8].copy_from_slice(&self.tv_sec.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.tv_usec.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.offset.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.pulse.to_ne_bytes());
        buf[28..32].copy_from_slice(&self.leap.to_ne_bytes());
        buf[32..36].copy_from_slice(&self._pad.to_ne_bytes());
        buf[36..40].copy_from_slice(&self.magic.to_ne_bytes());
        buf
    }
}

/// Thin wrapper over a connected `UnixDatagram`, opened once per configured
/// chrony socket path (`/var/run/chrony.ttyUSB0.sock` by convention).
pub struct ChronySocket {
    socket: UnixDatagram,
}

impl ChronySocket {
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self { socket })
    }

    pub fn send_sample(&self, sample: SockSample) -> io::Result<()> {
        self.socket.send(&sample.to_wire())?;
        Ok(())
    }
}
