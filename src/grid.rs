use ndarray::Array2;

/// The width × height score matrix. Zero-initialized; each cell is written
/// exactly once per run, during a buffer drain.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreGrid {
    scores: Array2<u16>,
}

impl ScoreGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            scores: Array2::zeros((height, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.scores.ncols()
    }

    pub fn height(&self) -> usize {
        self.scores.nrows()
    }

    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.scores[[y, x]]
    }

    pub fn set(&mut self, x: usize, y: usize, score: u16) {
        self.scores[[y, x]] = score;
    }

    /// Row-major view for renderers.
    pub fn rows(&self) -> impl Iterator<Item = &[u16]> {
        self.scores.rows().into_iter().map(|row| {
            row.to_slice()
                .expect("score rows are contiguous in memory")
        })
    }
}
