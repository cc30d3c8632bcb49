use std::fmt;

use image::{Rgb, RgbImage};

use crate::grid::ScoreGrid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaintError {
    /// A score fell above every configured band. The band table is a
    /// contract with the scorer; a hole in it is a bug, not a pixel to skip.
    UnmappedScore(u16),
}

impl fmt::Display for PaintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmappedScore(score) => {
                write!(f, "score {} has no character band", score)
            }
        }
    }
}

impl std::error::Error for PaintError {}

pub trait CharScale {
    fn score_char(&self, score: u16) -> Result<char, PaintError>;
}

/// Ordered score bands: each entry maps scores up to and including its
/// bound to a character.
#[derive(Clone, Debug)]
pub struct Bands {
    bands: Vec<(u16, char)>,
}

impl Bands {
    pub fn new(bands: Vec<(u16, char)>) -> Self {
        assert!(!bands.is_empty(), "no bands");
        assert!(
            bands.windows(2).all(|w| w[0].0 < w[1].0),
            "band bounds must be strictly increasing"
        );
        Self { bands }
    }

    /// The classic four-band scale. Fixed bands at or above `max_score`
    /// collapse into the densest band, so small iteration bounds stay valid.
    pub fn classic(max_score: u16) -> Self {
        let mut bands: Vec<(u16, char)> = [(10, ' '), (100, '.'), (200, 'x')]
            .into_iter()
            .filter(|(bound, _)| *bound < max_score)
            .collect();
        bands.push((max_score, 'O'));
        Self::new(bands)
    }
}

impl CharScale for Bands {
    fn score_char(&self, score: u16) -> Result<char, PaintError> {
        self.bands
            .iter()
            .find(|(bound, _)| score <= *bound)
            .map(|(_, c)| *c)
            .ok_or(PaintError::UnmappedScore(score))
    }
}

pub struct AsciiPainter<C> {
    scale: C,
}

impl<C> AsciiPainter<C>
where
    C: CharScale,
{
    pub fn new(scale: C) -> Self {
        Self { scale }
    }

    pub fn paint(&self, grid: &ScoreGrid) -> Result<String, PaintError> {
        let mut out = String::with_capacity((grid.width() + 1) * grid.height());
        for row in grid.rows() {
            for &score in row {
                out.push(self.scale.score_char(score)?);
            }
            out.push('\n');
        }
        Ok(out)
    }
}

pub struct GreyscalePainter {
    max_score: f64,
}

impl GreyscalePainter {
    pub fn new(max_score: u16) -> Self {
        Self {
            max_score: max_score as f64,
        }
    }

    fn score_color(&self, score: u16) -> Rgb<u8> {
        let frac = (score as f64 / self.max_score).clamp(0.0, 1.0);
        let v: u8 = 255 - (frac * 255.0).round() as u8;
        Rgb([v, v, v])
    }

    pub fn paint(&self, grid: &ScoreGrid) -> RgbImage {
        let mut img = RgbImage::new(grid.width() as u32, grid.height() as u32);
        for (y, row) in grid.rows().enumerate() {
            for (x, &score) in row.iter().enumerate() {
                img.put_pixel(x as u32, y as u32, self.score_color(score));
            }
        }
        img
    }
}
