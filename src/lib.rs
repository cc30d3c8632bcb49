#![allow(clippy::new_without_default)]
pub mod coord;
pub mod engine;
pub mod grid;
pub mod painter;
pub mod score;

pub use engine::{BatchAllocator, Engine, EngineError, FlushGate, DEFAULT_BATCH_SIZE};
pub use grid::ScoreGrid;
pub use score::{EscapeTime, Scorer};

use coord::{Frame, PixelMapper};

/// An engine over the classic Mandelbrot window with default iteration and
/// batch constants.
pub fn engine(width: usize, height: usize) -> Engine<EscapeTime> {
    let mapper = PixelMapper::new(width, height, Frame::default());
    Engine::new(EscapeTime::default(), mapper)
}
