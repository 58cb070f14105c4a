//! Fixture geometry as seen by the render core
//!
//! The engine only needs the pixel count; patterns that care about space
//! can look up coordinates.

/// Position of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Pixel geometry of the connected fixtures
pub trait Model: Send + Sync {
    /// Number of addressable pixels
    fn size(&self) -> usize;

    /// Coordinates of one pixel
    fn point(&self, index: usize) -> Option<Point>;

    /// Pixel position along the model's primary axis, 0.0 - 1.0
    fn normalized(&self, index: usize) -> Option<f32> {
        let size = self.size();
        if index >= size {
            return None;
        }
        if size == 1 {
            return Some(0.0);
        }
        Some(index as f32 / (size - 1) as f32)
    }
}

/// A straight run of evenly spaced pixels along x
#[derive(Debug, Clone)]
pub struct StripModel {
    len: usize,
    spacing: f32,
}

impl StripModel {
    pub fn new(len: usize) -> Self {
        Self { len, spacing: 1.0 }
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }
}

impl Model for StripModel {
    fn size(&self) -> usize {
        self.len
    }

    fn point(&self, index: usize) -> Option<Point> {
        (index < self.len).then(|| Point::new(index as f32 * self.spacing, 0.0, 0.0))
    }
}

/// A row-major rectangular matrix
#[derive(Debug, Clone)]
pub struct GridModel {
    width: usize,
    height: usize,
    serpentine: bool,
}

impl GridModel {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            serpentine: false,
        }
    }

    /// Odd rows run right-to-left, as in zig-zag wired panels
    pub fn serpentine(mut self) -> Self {
        self.serpentine = true;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

impl Model for GridModel {
    fn size(&self) -> usize {
        self.width * self.height
    }

    fn point(&self, index: usize) -> Option<Point> {
        if index >= self.size() {
            return None;
        }
        let row = index / self.width;
        let mut col = index % self.width;
        if self.serpentine && row % 2 == 1 {
            col = self.width - 1 - col;
        }
        Some(Point::new(col as f32, row as f32, 0.0))
    }
}
