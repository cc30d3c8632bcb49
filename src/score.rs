use num::complex::Complex;

/// A pure scoring function over the complex plane. Implementations hold no
/// shared mutable state, so any number of workers may call them concurrently.
pub trait Scorer: Send + Sync {
    fn score(&self, c: Complex<f64>) -> u16;

    /// Upper bound on any value `score` can return.
    fn max_score(&self) -> u16;
}

/// Classic Mandelbrot escape-time iteration: z := z² + c until |z| exceeds
/// the threshold, scoring the number of iterations run.
#[derive(Clone, Debug)]
pub struct EscapeTime {
    iterations: u16,
    threshold: f64,
}

impl EscapeTime {
    pub fn new(iterations: u16, threshold: f64) -> Self {
        Self {
            iterations,
            threshold,
        }
    }

    pub fn with_iterations(iterations: u16) -> Self {
        Self::new(iterations, 2.0)
    }
}

impl Default for EscapeTime {
    fn default() -> Self {
        Self::new(1000, 2.0)
    }
}

impl Scorer for EscapeTime {
    fn score(&self, c: Complex<f64>) -> u16 {
        let mut z = Complex::new(0.0, 0.0);
        let limit = self.threshold * self.threshold;
        for i in 0..self.iterations {
            z = z * z + c;
            if z.norm_sqr() > limit {
                return i;
            }
        }
        self.iterations
    }

    fn max_score(&self) -> u16 {
        self.iterations
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interior_point_never_escapes() {
        let scorer = EscapeTime::default();
        assert_eq!(scorer.score(Complex::new(0.0, 0.0)), 1000);
        // c = -1 cycles between 0 and -1
        assert_eq!(scorer.score(Complex::new(-1.0, 0.0)), 1000);
    }

    #[test]
    fn test_exterior_point_escapes_fast() {
        let scorer = EscapeTime::default();
        // z1 = 2, |z1| == 2 is not an escape; z2 = 6 is
        assert_eq!(scorer.score(Complex::new(2.0, 0.0)), 1);
        assert_eq!(scorer.score(Complex::new(100.0, 100.0)), 0);
    }

    #[test]
    fn test_score_bounded_by_max() {
        let scorer = EscapeTime::with_iterations(50);
        assert_eq!(scorer.max_score(), 50);
        for re in [-2.0, -1.0, -0.5, 0.0, 0.3, 1.0] {
            assert!(scorer.score(Complex::new(re, 0.1)) <= 50);
        }
    }
}
