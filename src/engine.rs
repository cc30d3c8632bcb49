use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, trace};

use crate::coord::PixelMapper;
use crate::grid::ScoreGrid;
use crate::score::Scorer;

pub const DEFAULT_BATCH_SIZE: usize = 20_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    AlreadyRunning,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "engine is already running"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Hands out contiguous index ranges ("batches") of the flat work space.
/// A single fetch-add per claim; never blocks, never hands the same
/// ordinal to two callers.
pub struct BatchAllocator {
    next: AtomicUsize,
    batch_size: usize,
    total: usize,
}

impl BatchAllocator {
    pub fn new(total: usize, batch_size: usize) -> Self {
        assert!(batch_size > 0, "zero batch size");
        Self {
            next: AtomicUsize::new(0),
            batch_size,
            total,
        }
    }

    pub fn batches(&self) -> usize {
        self.total.div_ceil(self.batch_size)
    }

    /// Claims the next unclaimed batch. The final range may extend past
    /// `total`; callers clamp before computing.
    pub fn claim(&self) -> Option<Range<usize>> {
        let ordinal = self.next.fetch_add(1, Ordering::Relaxed);
        if ordinal >= self.batches() {
            return None;
        }
        let start = ordinal * self.batch_size;
        Some(start..start + self.batch_size)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

/// Spin-acquired exclusion over the value it owns. Workers that lose the
/// race burn cycles retrying instead of parking; a drain is a short memory
/// copy, so the wait is bounded. No backoff, no fairness.
pub struct FlushGate<T> {
    flag: AtomicBool,
    value: UnsafeCell<T>,
}

// Exclusive access is enforced by the flag CAS in `lock`.
unsafe impl<T: Send> Sync for FlushGate<T> {}

impl<T> FlushGate<T> {
    pub fn new(value: T) -> Self {
        Self {
            flag: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> FlushGuard<'_, T> {
        while self
            .flag
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        FlushGuard { gate: self }
    }
}

pub struct FlushGuard<'a, T> {
    gate: &'a FlushGate<T>,
}

impl<T> Deref for FlushGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Holding the guard means the CAS in `lock` succeeded.
        unsafe { &*self.gate.value.get() }
    }
}

impl<T> DerefMut for FlushGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.gate.value.get() }
    }
}

impl<T> Drop for FlushGuard<'_, T> {
    fn drop(&mut self) {
        self.gate.flag.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug)]
struct ResultEntry {
    x: usize,
    y: usize,
    score: u16,
}

/// Per-worker private accumulator. Entries pile up locally while computing
/// and move to the shared grid in one pass while the gate is held.
struct ResultBuffer {
    entries: Vec<ResultEntry>,
}

impl ResultBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, entry: ResultEntry) {
        self.entries.push(entry);
    }

    fn drain_into(&mut self, grid: &mut ScoreGrid) {
        for entry in &self.entries {
            grid.set(entry.x, entry.y, entry.score);
        }
        self.entries.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn worker_loop<S: Scorer>(
    id: usize,
    scorer: &S,
    mapper: &PixelMapper,
    allocator: &BatchAllocator,
    gate: &FlushGate<ScoreGrid>,
) {
    let mut buffer = ResultBuffer::with_capacity(allocator.batch_size);
    let total = mapper.len();
    debug!("worker {} started", id);
    while let Some(range) = allocator.claim() {
        trace!("worker {} claimed indices {}..{}", id, range.start, range.end);
        // The trailing batch may overrun the pixel plane.
        for index in range.start..range.end.min(total) {
            let (x, y) = mapper.position(index);
            let score = scorer.score(mapper.point(x, y));
            buffer.push(ResultEntry { x, y, score });
        }
        let mut grid = gate.lock();
        buffer.drain_into(&mut grid);
    }
    debug!("worker {} exhausted the batch space", id);
}

/// Owns the allocator, the gated grid, and the worker threads. Reusable:
/// `start` resets the allocator and spawns a fresh pool, `wait` joins it.
pub struct Engine<S> {
    scorer: Arc<S>,
    mapper: PixelMapper,
    batch_size: usize,
    allocator: Arc<BatchAllocator>,
    grid: Arc<FlushGate<ScoreGrid>>,
    running: bool,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<S> Engine<S>
where
    S: Scorer + 'static,
{
    pub fn new(scorer: S, mapper: PixelMapper) -> Self {
        Self::with_batch_size(scorer, mapper, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(scorer: S, mapper: PixelMapper, batch_size: usize) -> Self {
        let total = mapper.len();
        let grid = ScoreGrid::new(mapper.width(), mapper.height());
        Self {
            scorer: Arc::new(scorer),
            mapper,
            batch_size,
            allocator: Arc::new(BatchAllocator::new(total, batch_size)),
            grid: Arc::new(FlushGate::new(grid)),
            running: false,
            workers: Vec::new(),
        }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn mapper(&self) -> &PixelMapper {
        &self.mapper
    }

    /// Spawns `threads` workers over a freshly reset batch space. Fails if
    /// a previous run has not been waited out.
    pub fn start(&mut self, threads: usize) -> Result<(), EngineError> {
        assert!(threads > 0, "no workers");
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }
        self.running = true;
        self.allocator.reset();
        debug!(
            "starting {} workers over {} indices in batches of {}",
            threads,
            self.mapper.len(),
            self.batch_size
        );
        self.workers.reserve(threads);
        for id in 0..threads {
            let scorer = Arc::clone(&self.scorer);
            let mapper = self.mapper.clone();
            let allocator = Arc::clone(&self.allocator);
            let grid = Arc::clone(&self.grid);
            self.workers.push(thread::spawn(move || {
                worker_loop(id, scorer.as_ref(), &mapper, &allocator, &grid);
            }));
        }
        Ok(())
    }

    /// Blocks until every worker has drained its last buffer and exited.
    /// Returns immediately when no run is in flight.
    pub fn wait(&mut self) {
        if !self.running {
            return;
        }
        for worker in self.workers.drain(..) {
            if let Err(panic) = worker.join() {
                std::panic::resume_unwind(panic);
            }
        }
        self.running = false;
        debug!("all workers joined");
    }

    /// The score grid. Only meaningful after `wait`; locking here while a
    /// run is in flight stalls every worker at its next drain.
    pub fn grid(&self) -> FlushGuard<'_, ScoreGrid> {
        self.grid.lock()
    }
}

impl<S> Drop for Engine<S> {
    fn drop(&mut self) {
        if !self.running {
            return;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use num::complex::Complex;

    use super::*;
    use crate::coord::{Frame, PixelMapper};
    use crate::score::EscapeTime;

    /// Frame whose points come out as (x, y) directly, so a scorer can see
    /// pixel coordinates.
    fn identity_mapper(width: usize, height: usize) -> PixelMapper {
        let frame = Frame::from_nums(0.0, width as f64, 0.0, height as f64);
        PixelMapper::new(width, height, frame)
    }

    /// Scores a point as x + y under an identity frame.
    struct SumScorer;

    impl Scorer for SumScorer {
        fn score(&self, c: Complex<f64>) -> u16 {
            (c.re + c.im).round() as u16
        }
        fn max_score(&self) -> u16 {
            u16::MAX
        }
    }

    /// Counts how many times each work index gets scored.
    struct CountingScorer {
        width: usize,
        calls: Arc<Vec<AtomicU32>>,
    }

    impl Scorer for CountingScorer {
        fn score(&self, c: Complex<f64>) -> u16 {
            let x = c.re.round() as usize;
            let y = c.im.round() as usize;
            self.calls[y * self.width + x].fetch_add(1, Ordering::Relaxed);
            0
        }
        fn max_score(&self) -> u16 {
            0
        }
    }

    struct SlowScorer;

    impl Scorer for SlowScorer {
        fn score(&self, _c: Complex<f64>) -> u16 {
            thread::sleep(Duration::from_millis(1));
            0
        }
        fn max_score(&self) -> u16 {
            0
        }
    }

    #[test]
    fn test_allocator_ranges_are_contiguous() {
        let allocator = BatchAllocator::new(100, 30);
        assert_eq!(allocator.batches(), 4);
        assert_eq!(allocator.claim(), Some(0..30));
        assert_eq!(allocator.claim(), Some(30..60));
        assert_eq!(allocator.claim(), Some(60..90));
        // trailing partial batch overruns; workers clamp
        assert_eq!(allocator.claim(), Some(90..120));
        assert_eq!(allocator.claim(), None);
        assert_eq!(allocator.claim(), None);
    }

    #[test]
    fn test_allocator_reset() {
        let allocator = BatchAllocator::new(10, 10);
        assert_eq!(allocator.claim(), Some(0..10));
        assert_eq!(allocator.claim(), None);
        allocator.reset();
        assert_eq!(allocator.claim(), Some(0..10));
    }

    #[test]
    fn test_allocator_unique_ordinals_under_contention() {
        let allocator = Arc::new(BatchAllocator::new(8000, 1));
        let mut handles = vec![];
        for _ in 0..8 {
            let allocator = Arc::clone(&allocator);
            handles.push(thread::spawn(move || {
                let mut claimed = vec![];
                while let Some(range) = allocator.claim() {
                    claimed.push(range.start);
                }
                claimed
            }));
        }
        let mut seen = HashSet::new();
        let mut count = 0;
        for handle in handles {
            for start in handle.join().unwrap() {
                assert!(seen.insert(start), "batch {} claimed twice", start);
                count += 1;
            }
        }
        assert_eq!(count, 8000);
    }

    #[test]
    fn test_gate_mutual_exclusion() {
        let gate = Arc::new(FlushGate::new(0u64));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut held = gate.lock();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    *held += 1;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*gate.lock(), 8000);
    }

    #[test]
    fn test_buffer_drains_and_clears() {
        let mut buffer = ResultBuffer::with_capacity(4);
        buffer.push(ResultEntry { x: 0, y: 0, score: 7 });
        buffer.push(ResultEntry { x: 1, y: 1, score: 9 });
        let mut grid = ScoreGrid::new(2, 2);
        buffer.drain_into(&mut grid);
        assert_eq!(buffer.len(), 0);
        assert_eq!(grid.get(0, 0), 7);
        assert_eq!(grid.get(1, 1), 9);
        assert_eq!(grid.get(1, 0), 0);
    }

    #[test]
    fn test_sum_scorer_end_to_end() {
        let mut engine = Engine::with_batch_size(SumScorer, identity_mapper(4, 2), 3);
        engine.start(2).unwrap();
        engine.wait();
        let grid = engine.grid();
        let rows: Vec<&[u16]> = grid.rows().collect();
        assert_eq!(rows, vec![&[0, 1, 2, 3][..], &[1, 2, 3, 4][..]]);
    }

    #[test]
    fn test_every_cell_in_bounds() {
        let scorer = EscapeTime::with_iterations(60);
        let mapper = PixelMapper::new(37, 23, Frame::default());
        let mut engine = Engine::with_batch_size(scorer, mapper, 100);
        engine.start(4).unwrap();
        engine.wait();
        let grid = engine.grid();
        for y in 0..23 {
            for x in 0..37 {
                assert!(grid.get(x, y) <= 60);
            }
        }
    }

    #[test]
    fn test_thread_count_does_not_change_content() {
        let run = |threads: usize| {
            let scorer = EscapeTime::with_iterations(80);
            let mapper = PixelMapper::new(64, 48, Frame::default());
            let mut engine = Engine::with_batch_size(scorer, mapper, 257);
            engine.start(threads).unwrap();
            engine.wait();
            // bind the guard so it unlocks before `engine` drops
            let grid = engine.grid();
            grid.clone()
        };
        let single = run(1);
        assert_eq!(single, run(4));
        assert_eq!(single, run(7));
    }

    #[test]
    fn test_each_cell_computed_exactly_once() {
        let calls: Arc<Vec<AtomicU32>> =
            Arc::new((0..11 * 7).map(|_| AtomicU32::new(0)).collect());
        let scorer = CountingScorer {
            width: 11,
            calls: Arc::clone(&calls),
        };
        // 77 indices, batch size 10: trailing batch overruns by 3
        let mut engine = Engine::with_batch_size(scorer, identity_mapper(11, 7), 10);
        engine.start(4).unwrap();
        engine.wait();
        for (index, count) in calls.iter().enumerate() {
            assert_eq!(count.load(Ordering::Relaxed), 1, "index {}", index);
        }
    }

    #[test]
    fn test_trailing_batch_does_not_corrupt_grid() {
        // 10 indices, batch size 4: last batch covers 8..12
        let mut engine = Engine::with_batch_size(SumScorer, identity_mapper(5, 2), 4);
        engine.start(3).unwrap();
        engine.wait();
        let grid = engine.grid();
        for y in 0..2 {
            for x in 0..5 {
                assert_eq!(grid.get(x, y), (x + y) as u16);
            }
        }
    }

    #[test]
    fn test_double_start_reports_already_running() {
        let mut engine = Engine::with_batch_size(SlowScorer, identity_mapper(20, 20), 10);
        engine.start(2).unwrap();
        assert_eq!(engine.start(2), Err(EngineError::AlreadyRunning));
        engine.wait();
        // run completed despite the rejected second start
        assert_eq!(engine.grid().get(19, 19), 0);
    }

    #[test]
    fn test_wait_is_idempotent() {
        let mut engine = Engine::with_batch_size(SumScorer, identity_mapper(4, 4), 4);
        engine.wait();
        engine.start(2).unwrap();
        engine.wait();
        engine.wait();
        engine.start(1).unwrap();
        engine.wait();
        assert_eq!(engine.grid().get(3, 3), 6);
    }

    #[test]
    fn test_drop_joins_workers() {
        let mut engine = Engine::with_batch_size(SlowScorer, identity_mapper(10, 10), 10);
        engine.start(3).unwrap();
        drop(engine);
    }
}
