use num::complex::Complex;

#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    pub fn center(&self) -> f64 {
        (self.max + self.min) / 2.0
    }
}

/// The rectangular window of the complex plane that gets sampled.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub re: Axis,
    pub im: Axis,
}

impl Frame {
    pub fn new(re: Axis, im: Axis) -> Self {
        Self { re, im }
    }

    pub fn from_nums(re1: f64, re2: f64, im1: f64, im2: f64) -> Self {
        Self::new(Axis::new(re1, re2), Axis::new(im1, im2))
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.re.length() / self.im.length()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::from_nums(-2.0, 0.47, -1.12, 1.12)
    }
}

/// Maps between the flat work-index space, pixel coordinates, and the
/// complex plane. Index `i` covers the image row-major: `y = i / width`,
/// `x = i % width`.
#[derive(Clone, Debug)]
pub struct PixelMapper {
    width: usize,
    height: usize,
    frame: Frame,
}

impl PixelMapper {
    pub fn new(width: usize, height: usize, frame: Frame) -> Self {
        assert!(width > 0 && height > 0, "empty pixel plane");
        Self {
            width,
            height,
            frame,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of work indices.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self, index: usize) -> (usize, usize) {
        let y = index / self.width;
        let x = index - y * self.width;
        (x, y)
    }

    pub fn point(&self, x: usize, y: usize) -> Complex<f64> {
        let re = x as f64 / self.width as f64 * self.frame.re.length() + self.frame.re.min;
        let im = y as f64 / self.height as f64 * self.frame.im.length() + self.frame.im.min;
        Complex::new(re, im)
    }
}
