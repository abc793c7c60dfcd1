// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lock-free single-producer single-consumer ring buffer of stereo frames.
//!
//! Passes decoded audio from the file reader thread to the real-time audio
//! callback without blocking. A frame is a pair of (A, B) samples; the two
//! legs are stored as separate planes so the callback can pop straight into
//! the host's per-port buffers.
//!
//! The producer never overwrites unread data (`push` returns short when
//! full) and the consumer never reads past the producer (`pop` returns short
//! when empty). Positions are monotonic counters masked down to the storage
//! index, so `used + free == capacity` holds at every observation point.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed-capacity stereo SPSC frame queue.
///
/// Capacity is rounded up to the next power of two. Use [`FrameRing::split`]
/// to obtain the writer and reader handles, or the handle constructors when
/// the two ends must be wired up separately; in that case the caller is
/// responsible for keeping a single writer and a single reader alive.
pub struct FrameRing {
    plane_a: Box<[UnsafeCell<f32>]>,
    plane_b: Box<[UnsafeCell<f32>]>,
    /// Monotonic write position (only advanced by the writer).
    write_pos: AtomicU64,
    /// Monotonic read position (only advanced by the reader).
    read_pos: AtomicU64,
    capacity: usize,
    mask: u64,
}

// SAFETY: designed for SPSC access. The writer only stores into slots in
// [read_pos, read_pos + capacity) ahead of the reader, the reader only loads
// slots behind the writer, and the position atomics publish each side's
// progress with release/acquire ordering.
unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl FrameRing {
    /// Create a ring holding at least `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        let mut plane_a = Vec::with_capacity(capacity);
        let mut plane_b = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            plane_a.push(UnsafeCell::new(0.0));
            plane_b.push(UnsafeCell::new(0.0));
        }

        Self {
            plane_a: plane_a.into_boxed_slice(),
            plane_b: plane_b.into_boxed_slice(),
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
            capacity,
            mask: (capacity - 1) as u64,
        }
    }

    /// Frame capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Split into writer and reader handles.
    pub fn split(self) -> (FrameWriter, FrameReader) {
        let shared = Arc::new(self);
        (
            FrameWriter {
                inner: Arc::clone(&shared),
            },
            FrameReader { inner: shared },
        )
    }

    /// Frames currently queued.
    ///
    /// An impossible distance (greater than capacity) can be observed for an
    /// instant while the writer performs a seek-transition reset; it is
    /// reported as empty so the reader degrades to silence instead of
    /// reading past the writer.
    fn used(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        let distance = write.wrapping_sub(read);
        if distance > self.capacity as u64 {
            0
        } else {
            distance as usize
        }
    }

    fn free(&self) -> usize {
        self.capacity - self.used()
    }
}

/// Writer handle. Owned by the file reader thread.
pub struct FrameWriter {
    inner: Arc<FrameRing>,
}

impl FrameWriter {
    /// Construct a writer over a shared ring. At most one writer may exist.
    pub fn new(inner: Arc<FrameRing>) -> Self {
        Self { inner }
    }

    /// Push up to `a.len()` frames, returning the number actually queued.
    ///
    /// Never blocks and never overwrites unread frames; returns short when
    /// the ring is full. `a` and `b` must be the same length.
    pub fn push(&mut self, a: &[f32], b: &[f32]) -> usize {
        let frames = a.len().min(b.len());
        let write = self.inner.write_pos.load(Ordering::Relaxed);
        let count = frames.min(self.inner.free());

        for i in 0..count {
            let idx = (write.wrapping_add(i as u64) & self.inner.mask) as usize;
            // SAFETY: sole writer, and these slots are at least `count`
            // frames ahead of the reader.
            unsafe {
                *self.inner.plane_a[idx].get() = a[i];
                *self.inner.plane_b[idx].get() = b[i];
            }
        }

        self.inner
            .write_pos
            .store(write.wrapping_add(count as u64), Ordering::Release);
        count
    }

    /// Frames of free space.
    pub fn free(&self) -> usize {
        self.inner.free()
    }

    /// Frames currently queued.
    pub fn used(&self) -> usize {
        self.inner.used()
    }

    /// Total frames ever written. Monotonic across resets, which makes it
    /// usable as an end-of-stream marker.
    pub fn position(&self) -> u64 {
        self.inner.write_pos.load(Ordering::Relaxed)
    }

    /// Discard all queued frames and zero the storage.
    ///
    /// Only valid while the reader is quiescent (the seek/close protocol
    /// guarantees this: the callback does not pop while a seek is pending).
    pub fn reset(&mut self) {
        for cell in self.inner.plane_a.iter().chain(self.inner.plane_b.iter()) {
            // SAFETY: sole writer; the reader is quiescent per the protocol
            // above, and a stale concurrent pop would at worst read zeroes.
            unsafe {
                *cell.get() = 0.0;
            }
        }
        let write = self.inner.write_pos.load(Ordering::Relaxed);
        self.inner.read_pos.store(write, Ordering::Release);
    }
}

/// Reader handle. Owned by the real-time audio callback.
pub struct FrameReader {
    inner: Arc<FrameRing>,
}

impl FrameReader {
    /// Construct a reader over a shared ring. At most one reader may exist.
    pub fn new(inner: Arc<FrameRing>) -> Self {
        Self { inner }
    }

    /// Pop up to `frames` frames into `a` and `b`, returning the number
    /// actually read. Never blocks; returns short when the ring is empty.
    pub fn pop(&mut self, a: &mut [f32], b: &mut [f32], frames: usize) -> usize {
        let read = self.inner.read_pos.load(Ordering::Relaxed);
        let count = frames.min(a.len()).min(b.len()).min(self.inner.used());

        for i in 0..count {
            let idx = (read.wrapping_add(i as u64) & self.inner.mask) as usize;
            // SAFETY: sole reader, and these slots were published by the
            // writer's release store.
            unsafe {
                a[i] = *self.inner.plane_a[idx].get();
                b[i] = *self.inner.plane_b[idx].get();
            }
        }

        self.inner
            .read_pos
            .store(read.wrapping_add(count as u64), Ordering::Release);
        count
    }

    /// Frames currently queued.
    pub fn used(&self) -> usize {
        self.inner.used()
    }

    /// Total frames ever read. Compared against the writer's end-of-stream
    /// marker to detect the final sample.
    pub fn position(&self) -> u64 {
        self.inner.read_pos.load(Ordering::Relaxed)
    }
}
