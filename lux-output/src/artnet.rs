//! Art-Net ArtDmx datagrams

use crate::color::{ByteOrder, Correction};
use crate::datagram::{pack_rgb, Datagram};

const HEADER_LEN: usize = 18;
const MAX_PAYLOAD: usize = 512;
const OP_DMX: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;

pub struct ArtNetDatagram {
    universe: u16,
    physical: u8,
    sequence: u8,
    packet: [u8; HEADER_LEN + MAX_PAYLOAD],
}

impl ArtNetDatagram {
    pub const PORT: u16 = 6454;
    /// Pixels that fit in one universe
    pub const MAX_PIXELS: usize = MAX_PAYLOAD / 3;

    pub fn new(universe: u16) -> Self {
        let mut packet = [0u8; HEADER_LEN + MAX_PAYLOAD];
        packet[..8].copy_from_slice(b"Art-Net\0");
        packet[8..10].copy_from_slice(&OP_DMX.to_le_bytes());
        packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        Self {
            universe,
            physical: 0,
            sequence: 0,
            packet,
        }
    }

    pub fn with_physical(mut self, physical: u8) -> Self {
        self.physical = physical;
        self
    }

    pub fn universe(&self) -> u16 {
        self.universe
    }

    /// Sequence number of the last encoded packet; 0 before the first
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    fn next_sequence(&mut self) -> u8 {
        // 0 tells receivers sequencing is off
        self.sequence = match self.sequence.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        self.sequence
    }
}

impl Datagram for ArtNetDatagram {
    fn protocol(&self) -> &'static str {
        "artnet"
    }

    fn port(&self) -> u16 {
        Self::PORT
    }

    fn encode(&mut self, frame: &[u32], order: ByteOrder, correction: &Correction) -> &[u8] {
        let sequence = self.next_sequence();
        let (header, payload) = self.packet.split_at_mut(HEADER_LEN);

        let mut len = pack_rgb(payload, frame, order, correction);
        if len % 2 == 1 {
            payload[len] = 0;
            len += 1;
        }

        header[12] = sequence;
        header[13] = self.physical;
        header[14..16].copy_from_slice(&self.universe.to_le_bytes());
        header[16..18].copy_from_slice(&(len as u16).to_be_bytes());
        &self.packet[..HEADER_LEN + len]
    }
}
