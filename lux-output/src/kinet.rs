//! KiNET datagrams for Color Kinetics power supplies

use crate::color::{ByteOrder, Correction};
use crate::datagram::{pack_rgb, Datagram};

const MAGIC: [u8; 4] = [0x04, 0x01, 0xdc, 0x4a];
const PAYLOAD_LEN: usize = 512;

/// Header variant understood by the power supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KinetVersion {
    /// 24-byte header addressing one output port
    #[default]
    PortOut,
    /// 21-byte legacy header
    DmxOut,
}

impl KinetVersion {
    pub fn header_len(self) -> usize {
        match self {
            KinetVersion::PortOut => 24,
            KinetVersion::DmxOut => 21,
        }
    }
}

pub struct KinetDatagram {
    version: KinetVersion,
    port: u8,
    packet: Vec<u8>,
}

impl KinetDatagram {
    pub const PORT: u16 = 6038;
    pub const MAX_PIXELS: usize = PAYLOAD_LEN / 3;

    pub fn new(version: KinetVersion, port: u8) -> Self {
        let mut packet = vec![0u8; version.header_len() + PAYLOAD_LEN];
        packet[..4].copy_from_slice(&MAGIC);
        packet[4..6].copy_from_slice(&[0x01, 0x00]);
        match version {
            KinetVersion::PortOut => {
                packet[6..8].copy_from_slice(&[0x08, 0x01]);
                // 8..12 sequence, always zero
                packet[12..16].copy_from_slice(&[0xff; 4]);
                packet[16] = port;
                // 17 pad, 18..20 flags
                packet[20..22].copy_from_slice(&[0x00, 0x02]);
                // 22..24 start code
            }
            KinetVersion::DmxOut => {
                packet[6..8].copy_from_slice(&[0x01, 0x01]);
                // 8..12 sequence
                packet[12..14].copy_from_slice(&[0x00, port]);
                // 14 pad, 15..17 flags
                packet[17..21].copy_from_slice(&[0xff; 4]);
            }
        }
        Self { version, port, packet }
    }

    pub fn version(&self) -> KinetVersion {
        self.version
    }

    pub fn output_port(&self) -> u8 {
        self.port
    }
}

impl Datagram for KinetDatagram {
    fn protocol(&self) -> &'static str {
        "kinet"
    }

    fn port(&self) -> u16 {
        Self::PORT
    }

    fn encode(&mut self, frame: &[u32], order: ByteOrder, correction: &Correction) -> &[u8] {
        let (_, payload) = self.packet.split_at_mut(self.version.header_len());
        let written = pack_rgb(payload, frame, order, correction);
        payload[written..].fill(0);
        &self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portout_header() {
        let mut dg = KinetDatagram::new(KinetVersion::PortOut, 2);
        let packet = dg.encode(&[0xFFAA_BBCC], ByteOrder::Rgb, &Correction::default()).to_vec();
        assert_eq!(packet.len(), 24 + 512);
        assert_eq!(
            &packet[..24],
            &[
                0x04, 0x01, 0xdc, 0x4a, 0x01, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
                0xff, 0xff, 0x02, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            ]
        );
        assert_eq!(&packet[24..28], &[0xAA, 0xBB, 0xCC, 0x00]);
    }

    #[test]
    fn test_dmxout_header() {
        let mut dg = KinetDatagram::new(KinetVersion::DmxOut, 5);
        let packet = dg.encode(&[], ByteOrder::Rgb, &Correction::default()).to_vec();
        assert_eq!(packet.len(), 21 + 512);
        assert_eq!(
            &packet[..21],
            &[
                0x04, 0x01, 0xdc, 0x4a, 0x01, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05,
                0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
            ]
        );
        assert!(packet[21..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shorter_frame_clears_stale_pixels() {
        let mut dg = KinetDatagram::new(KinetVersion::PortOut, 1);
        dg.encode(&[0xFFFF_FFFF; 4], ByteOrder::Rgb, &Correction::default());
        let packet = dg.encode(&[0xFF01_0203], ByteOrder::Grb, &Correction::default());
        assert_eq!(&packet[24..27], &[0x02, 0x01, 0x03]);
        assert!(packet[27..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_long_frame_fills_exactly_one_payload() {
        let mut dg = KinetDatagram::new(KinetVersion::DmxOut, 1);
        let frame = vec![0xFF01_0203; KinetDatagram::MAX_PIXELS + 30];
        let packet = dg.encode(&frame, ByteOrder::Rgb, &Correction::default());
        assert_eq!(packet.len(), 21 + 512);
        assert_eq!(&packet[21 + 507..21 + 510], &[0x01, 0x02, 0x03]);
        // 512 is not a multiple of 3; the last two bytes stay clear
        assert_eq!(&packet[21 + 510..], &[0x00, 0x00]);
    }
}
