//! `gpsd-core`: sensor session engine and packet layer for a gpsd-style
//! GNSS multiplexer.
//!
//! The crate is organized bottom-up: [`bits`]/[`checksum`] are the
//! bit-twiddling primitives every decoder needs; [`lexer`] turns a raw
//! byte stream into framed [`packet::Packet`]s; [`driver`] arbitrates
//! which protocol decoder owns a session; [`decode`] holds the per-
//! protocol payload decoders; [`fix`]/[`sky`] are the session's
//! accumulated state; [`session`] wires all of the above together per
//! device; [`shm`]/[`chrony`]/[`pps`] export disciplined time to the
//! host's NTP daemon; [`publish`] is the JSON record surface clients see.

pub mod bits;
pub mod checksum;
pub mod cli;
pub mod chrony;
pub mod decode;
pub mod driver;
pub mod error;
pub mod fix;
pub mod lexer;
pub mod packet;
#[cfg(target_os = "linux")]
pub mod pps;
pub mod publish;
pub mod session;
pub mod settings;
pub mod shm;
pub mod sky;
pub mod time;

pub use error::{GpsdError, GpsdResult};
pub use fix::{FixMode, GpsFix, GpsMask};
pub use packet::{Packet, PacketKind, PacketTypeMask};
pub use session::Session;
pub use settings::DeviceConfig;
pub use shm::ShmRegistry;
pub use time::Context;
