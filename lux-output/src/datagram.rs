use crate::color::{ByteOrder, Correction};
use std::time::{Duration, Instant};

/// A wire format that turns one frame of packed 8-bit colors into a datagram
pub trait Datagram: Send {
    /// Short protocol name for logs
    fn protocol(&self) -> &'static str;

    /// Default UDP destination port
    fn port(&self) -> u16;

    /// Encode a frame and return the bytes to send
    ///
    /// Pixels past the protocol's payload limit are dropped.
    fn encode(&mut self, frame: &[u32], order: ByteOrder, correction: &Correction) -> &[u8];
}

/// Write corrected, reordered RGB triples into `payload`, stopping when it is full
pub(crate) fn pack_rgb(payload: &mut [u8], frame: &[u32], order: ByteOrder, correction: &Correction) -> usize {
    let mut written = 0;
    for (chunk, &argb) in payload.chunks_exact_mut(3).zip(frame) {
        let (r, g, b) = correction.rgb(argb);
        chunk.copy_from_slice(&order.arrange(r, g, b));
        written += 3;
    }
    written
}

/// Frame-rate limiter for a single output
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Throttle {
    /// `fps <= 0` lets every frame through
    pub fn new(fps: f64) -> Self {
        let interval = (fps.is_finite() && fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        Self { interval, last: None }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn fps(&self) -> f64 {
        self.interval.map_or(0.0, |i| 1.0 / i.as_secs_f64())
    }

    /// Whether a frame may go out at `now`; records the send when it may
    pub fn ready(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            self.last = Some(now);
            return true;
        };
        match self.last {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_spacing() {
        let mut throttle = Throttle::new(10.0);
        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(50)));
        assert!(throttle.ready(t0 + Duration::from_millis(100)));
        assert!(!throttle.ready(t0 + Duration::from_millis(150)));
        assert!((throttle.fps() - 10.0).abs() < 1e-9);

        throttle.reset();
        assert!(throttle.ready(t0 + Duration::from_millis(101)));
    }

    #[test]
    fn test_unlimited_throttle() {
        let mut throttle = Throttle::unlimited();
        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(throttle.ready(t0));
        assert_eq!(throttle.fps(), 0.0);
    }

    #[test]
    fn test_pack_rgb_stops_at_payload_end() {
        let mut payload = [0u8; 6];
        let frame = [0xFF11_2233, 0xFF44_5566, 0xFF77_8899];
        let n = pack_rgb(&mut payload, &frame, ByteOrder::Bgr, &Correction::default());
        assert_eq!(n, 6);
        assert_eq!(payload, [0x33, 0x22, 0x11, 0x66, 0x55, 0x44]);
    }
}
