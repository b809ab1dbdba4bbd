//! Parallel chunked execution with cooperative cancellation.
//!
//! A unit-of-work range `[0, U)` is split into `W` contiguous chunks of
//! `ceil(U / W)` units (the last one shorter). Each chunk runs as an
//! independent rayon task and the call joins them all before returning.
//!
//! The stop token is checked once at the start of every chunk. Chunk
//! boundaries depend only on `U` and `W`; chunks never share mutable state,
//! so the aggregate output is identical for any worker count.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use enough::{Stop, StopReason, Unstoppable};
use rayon::prelude::*;

use crate::error::FilterResult;

/// Cloneable cancellation flag shared between a caller and its operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Stop for CancelToken {
    fn check(&self) -> Result<(), StopReason> {
        if self.is_cancelled() {
            Err(StopReason::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Splits work into one contiguous chunk per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkedExecutor {
    workers: usize,
}

impl Default for ChunkedExecutor {
    fn default() -> Self {
        Self::with_available_parallelism()
    }
}

impl ChunkedExecutor {
    /// Create an executor with an explicit worker count (at least 1).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// One worker per thread of the rayon pool.
    pub fn with_available_parallelism() -> Self {
        Self::new(rayon::current_num_threads())
    }

    /// Single-worker executor, useful for reference runs.
    pub fn sequential() -> Self {
        Self::new(1)
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Units per chunk: `ceil(units / workers)`, never zero.
    #[inline]
    pub fn chunk_len(&self, units: usize) -> usize {
        units.div_ceil(self.workers).max(1)
    }

    /// Chunk ranges covering `[0, units)`.
    pub fn chunks(&self, units: usize) -> impl Iterator<Item = Range<usize>> {
        let len = self.chunk_len(units);
        (0..units)
            .step_by(len)
            .map(move |start| start..(start + len).min(units))
    }

    /// Run `f` on every chunk of `out`, where one unit is `unit_len` elements.
    ///
    /// Each task receives the index of its first unit and an exclusive slice
    /// of whole units. `out.len()` must be a multiple of `unit_len`.
    pub fn for_each_chunk_mut<T, F>(
        &self,
        out: &mut [T],
        unit_len: usize,
        stop: &(dyn Stop + Sync),
        f: F,
    ) -> FilterResult<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        let unit_len = unit_len.max(1);
        debug_assert_eq!(out.len() % unit_len, 0, "output is not a whole number of units");
        let units = out.len() / unit_len;
        if units == 0 {
            return stop.check().map_err(Into::into);
        }
        let chunk_units = self.chunk_len(units);

        out.par_chunks_mut(chunk_units * unit_len)
            .enumerate()
            .try_for_each(|(chunk, slice)| -> FilterResult<()> {
                stop.check()?;
                f(chunk * chunk_units, slice);
                Ok(())
            })
    }

    /// Build a new sample vector of `units` elements, computing each chunk with `f`.
    ///
    /// `f` receives the absolute index of every element it must fill.
    pub fn map_indices<T, F>(&self, units: usize, stop: &(dyn Stop + Sync), f: F) -> FilterResult<Vec<T>>
    where
        T: Send + Default + Clone,
        F: Fn(usize) -> T + Sync,
    {
        let mut out = vec![T::default(); units];
        self.for_each_chunk_mut(&mut out, 1, stop, |start, slice| {
            for (offset, item) in slice.iter_mut().enumerate() {
                *item = f(start + offset);
            }
        })?;
        Ok(out)
    }

    /// Map every sample of `src` independently.
    pub fn map_pixels<F>(&self, src: &[u32], stop: &(dyn Stop + Sync), f: F) -> FilterResult<Vec<u32>>
    where
        F: Fn(u32) -> u32 + Sync,
    {
        self.map_indices(src.len(), stop, |i| f(src[i]))
    }

    /// Run `f` over every chunk of `[0, units)` and collect the per-chunk
    /// results in chunk order.
    pub fn map_chunks<R, F>(&self, units: usize, stop: &(dyn Stop + Sync), f: F) -> FilterResult<Vec<R>>
    where
        R: Send,
        F: Fn(Range<usize>) -> R + Sync,
    {
        let ranges: Vec<Range<usize>> = self.chunks(units).collect();
        ranges
            .into_par_iter()
            .map(|range| -> FilterResult<R> {
                stop.check()?;
                Ok(f(range))
            })
            .collect()
    }
}

/// Executor plus stop token, handed to every filter invocation.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    executor: ChunkedExecutor,
    stop: &'a (dyn Stop + Sync),
}

impl<'a> RunContext<'a> {
    pub fn new(executor: ChunkedExecutor, stop: &'a (dyn Stop + Sync)) -> Self {
        Self { executor, stop }
    }

    #[inline]
    pub fn executor(&self) -> ChunkedExecutor {
        self.executor
    }

    #[inline]
    pub fn stop(&self) -> &'a (dyn Stop + Sync) {
        self.stop
    }

    /// Fail with `FilterError::Cancelled` once the token has fired.
    #[inline]
    pub fn check(&self) -> FilterResult<()> {
        self.stop.check().map_err(Into::into)
    }
}

impl RunContext<'static> {
    /// A context that can never be cancelled.
    pub fn unstoppable(executor: ChunkedExecutor) -> Self {
        Self::new(executor, &Unstoppable)
    }
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("executor", &self.executor)
            .field("stopped", &self.stop.check().is_err())
            .finish()
    }
}
