//! UDP transport
//!
//! A [`UdpOutput`] owns one socket and one datagram encoder. Each frame the
//! engine hands over is throttled, corrected, encoded and sent to a single
//! destination. Send failures are counted and reported to the engine, which
//! logs them and moves on.

use crate::artnet::ArtNetDatagram;
use crate::color::{ByteOrder, Correction};
use crate::datagram::{Datagram, Throttle};
use crate::error::OutputError;
use crate::kinet::{KinetDatagram, KinetVersion};
use lux_render::{ColorBuffer, Output, RenderError, RenderResult};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;
use tracing::{debug, info};

pub struct UdpOutput {
    name: String,
    socket: UdpSocket,
    target: SocketAddr,
    datagram: Box<dyn Datagram>,
    order: ByteOrder,
    correction: Correction,
    throttle: Throttle,
    enabled: bool,
    sent: u64,
    failures: u64,
}

impl UdpOutput {
    /// Bind an ephemeral socket and resolve `host`
    ///
    /// `host` may carry its own port; otherwise the protocol's port is used.
    pub fn new(name: impl Into<String>, host: &str, datagram: Box<dyn Datagram>) -> Result<Self, OutputError> {
        let target = resolve(host, datagram.port())?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_broadcast(true)?;
        let name = name.into();
        info!(protocol = datagram.protocol(), output = %name, %target, "output ready");
        Ok(Self {
            name,
            socket,
            target,
            datagram,
            order: ByteOrder::default(),
            correction: Correction::default(),
            throttle: Throttle::unlimited(),
            enabled: true,
            sent: 0,
            failures: 0,
        })
    }

    pub fn artnet(host: &str, universe: u16) -> Result<Self, OutputError> {
        Self::new(
            format!("artnet:{host}/{universe}"),
            host,
            Box::new(ArtNetDatagram::new(universe)),
        )
    }

    pub fn kinet(host: &str, version: KinetVersion, port: u8) -> Result<Self, OutputError> {
        Self::new(
            format!("kinet:{host}/{port}"),
            host,
            Box::new(KinetDatagram::new(version, port)),
        )
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_correction(mut self, correction: Correction) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.throttle = Throttle::new(fps);
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    pub fn correction(&self) -> &Correction {
        &self.correction
    }

    pub fn set_correction(&mut self, correction: Correction) {
        self.correction = correction;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.throttle.reset();
    }

    /// Datagrams sent successfully
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl Output for UdpOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, frame: &ColorBuffer) -> RenderResult<()> {
        if !self.enabled || !self.throttle.ready(Instant::now()) {
            return Ok(());
        }

        let converted;
        let pixels: &[u32] = match frame.as_rgb8() {
            Some(pixels) => pixels,
            None => {
                converted = frame.to_argb8();
                &converted
            }
        };

        let packet = self.datagram.encode(pixels, self.order, &self.correction);
        match self.socket.send_to(packet, self.target) {
            Ok(_) => {
                self.sent += 1;
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                debug!(output = %self.name, failures = self.failures, error = %e, "send failed");
                Err(RenderError::output(self.name.clone(), OutputError::Io(e)))
            }
        }
    }
}

fn resolve(host: &str, default_port: u16) -> Result<SocketAddr, OutputError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(OutputError::InvalidAddress("empty host".to_string()));
    }
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    (host, default_port)
        .to_socket_addrs()
        .map_err(|e| OutputError::InvalidAddress(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| OutputError::InvalidAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_render::ColorSpace;
    use std::time::Duration;

    fn receiver() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    #[test]
    fn test_resolve_default_port() {
        assert_eq!(resolve("127.0.0.1", 6454).unwrap().port(), 6454);
        assert_eq!(resolve("127.0.0.1:7000", 6454).unwrap().port(), 7000);
        assert!(resolve("", 6454).is_err());
    }

    #[test]
    fn test_artnet_loopback() {
        let (rx, addr) = receiver();
        let mut output = UdpOutput::artnet(&addr, 1)
            .unwrap()
            .with_order(ByteOrder::Grb)
            .with_correction(Correction::new(0.5, 1.0));

        let mut frame = ColorBuffer::new(ColorSpace::Rgb8, 2);
        frame.set_argb8(0, 0xFFFF_0000);
        frame.set_argb8(1, 0xFF00_00FF);
        output.send(&frame).unwrap();

        let mut buf = [0u8; 600];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, 18 + 6);
        assert_eq!(&buf[..8], b"Art-Net\0");
        assert_eq!(&buf[18..24], &[0, 128, 0, 0, 0, 128]);
        assert_eq!(output.sent(), 1);
    }

    #[test]
    fn test_rgb16_frames_are_narrowed() {
        let (rx, addr) = receiver();
        let mut output = UdpOutput::kinet(&addr, KinetVersion::PortOut, 1).unwrap();

        let mut frame = ColorBuffer::new(ColorSpace::Rgb16, 1);
        frame.set_argb8(0, 0xFF12_3456);
        output.send(&frame).unwrap();

        let mut buf = [0u8; 600];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, 24 + 512);
        assert_eq!(&buf[24..27], &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_disabled_and_throttled_outputs_skip() {
        let (_rx, addr) = receiver();
        let frame = ColorBuffer::new(ColorSpace::Rgb8, 4);

        let mut output = UdpOutput::artnet(&addr, 0).unwrap();
        output.set_enabled(false);
        output.send(&frame).unwrap();
        assert_eq!(output.sent(), 0);

        let mut output = UdpOutput::artnet(&addr, 0).unwrap().with_fps(0.5);
        output.send(&frame).unwrap();
        output.send(&frame).unwrap();
        assert_eq!(output.sent(), 1);
    }
}
