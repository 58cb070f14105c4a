//! Network outputs for LUX
//!
//! Frames from the engine are color corrected, reordered per fixture and
//! packed into Art-Net or KiNET datagrams sent over UDP.

mod artnet;
mod color;
mod datagram;
mod error;
mod kinet;
mod udp;

pub use artnet::ArtNetDatagram;
pub use color::{ByteOrder, Correction};
pub use datagram::{Datagram, Throttle};
pub use error::OutputError;
pub use kinet::{KinetDatagram, KinetVersion};
pub use udp::UdpOutput;
