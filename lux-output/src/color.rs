//! Per-output color handling: byte order, brightness and gamma

use crate::error::OutputError;
use std::fmt;
use std::str::FromStr;

/// Position of the R, G and B bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ByteOrder {
    pub const ALL: [ByteOrder; 6] = [
        ByteOrder::Rgb,
        ByteOrder::Rbg,
        ByteOrder::Grb,
        ByteOrder::Gbr,
        ByteOrder::Brg,
        ByteOrder::Bgr,
    ];

    /// Arrange one pixel's bytes
    #[inline]
    pub fn arrange(self, r: u8, g: u8, b: u8) -> [u8; 3] {
        match self {
            ByteOrder::Rgb => [r, g, b],
            ByteOrder::Rbg => [r, b, g],
            ByteOrder::Grb => [g, r, b],
            ByteOrder::Gbr => [g, b, r],
            ByteOrder::Brg => [b, r, g],
            ByteOrder::Bgr => [b, g, r],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Rgb => "rgb",
            ByteOrder::Rbg => "rbg",
            ByteOrder::Grb => "grb",
            ByteOrder::Gbr => "gbr",
            ByteOrder::Brg => "brg",
            ByteOrder::Bgr => "bgr",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ByteOrder {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|o| o.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| OutputError::UnknownByteOrder(s.to_string()))
    }
}

/// Brightness and gamma folded into one lookup table
#[derive(Clone)]
pub struct Correction {
    brightness: f64,
    gamma: f64,
    lut: [u8; 256],
}

impl Correction {
    pub fn new(brightness: f64, gamma: f64) -> Self {
        let brightness = if brightness.is_nan() { 1.0 } else { brightness.clamp(0.0, 1.0) };
        let gamma = if gamma.is_finite() && gamma > 0.0 { gamma } else { 1.0 };
        let mut lut = [0u8; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            let x = i as f64 / 255.0;
            *v = (255.0 * x.powf(gamma) * brightness).round() as u8;
        }
        Self { brightness, gamma, lut }
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[inline]
    pub fn apply(&self, v: u8) -> u8 {
        self.lut[usize::from(v)]
    }

    /// Corrected `(r, g, b)` of a packed 8-bit color, alpha ignored
    #[inline]
    pub fn rgb(&self, argb: u32) -> (u8, u8, u8) {
        (
            self.apply((argb >> 16) as u8),
            self.apply((argb >> 8) as u8),
            self.apply(argb as u8),
        )
    }

    pub fn is_identity(&self) -> bool {
        self.lut.iter().enumerate().all(|(i, &v)| usize::from(v) == i)
    }
}

impl Default for Correction {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl fmt::Debug for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correction")
            .field("brightness", &self.brightness)
            .field("gamma", &self.gamma)
            .finish()
    }
}
