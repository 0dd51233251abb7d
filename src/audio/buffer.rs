//! Lock-free sample channel between the capture thread and the frame loop
//!
//! The capture callback runs on a real-time thread and must never block, so
//! samples travel through an SPSC ring buffer from the `ringbuf` crate:
//! - The audio thread is the single producer (pushes mono samples)
//! - The frame loop is the single consumer (drains into an analysis window)
//!
//! A new channel is created for every connection. Dropping the producer with
//! the stream is what releases the device side of the binding.
//!
//! The ring can only drop the newest samples when it fills, so after an
//! overrun everything still queued predates the stall. The consumer notices
//! the drop count moving and discards that backlog along with its window.

use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Create a producer/consumer pair whose window holds `capacity` samples.
///
/// The ring between them queues at least `backlog` samples (and never less
/// than two windows), which is how long the frame loop may stall before
/// audio is lost.
pub fn sample_channel(capacity: usize, backlog: usize) -> (SampleProducer, SampleConsumer) {
    let capacity = capacity.max(1);
    let rb = HeapRb::<f32>::new(backlog.max(capacity * 2));
    let (prod, cons) = rb.split();

    let samples_written = Arc::new(AtomicU64::new(0));
    let samples_dropped = Arc::new(AtomicU64::new(0));

    let producer = SampleProducer {
        producer: prod,
        samples_written: Arc::clone(&samples_written),
        samples_dropped: Arc::clone(&samples_dropped),
    };

    let consumer = SampleConsumer {
        consumer: cons,
        samples_written,
        samples_dropped,
        dropped_seen: 0,
        overruns: 0,
        window: vec![0.0; capacity],
        capacity,
        write_pos: 0,
    };

    (producer, consumer)
}

/// Producer half (owned by the audio thread)
pub struct SampleProducer {
    producer: ringbuf::HeapProd<f32>,
    samples_written: Arc<AtomicU64>,
    samples_dropped: Arc<AtomicU64>,
}

impl SampleProducer {
    /// Push a single sample into the buffer
    ///
    /// Lock-free and safe to call from audio callbacks. When the buffer is
    /// full the sample is dropped.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        if self.producer.try_push(sample).is_err() {
            self.samples_dropped.fetch_add(1, Ordering::Release);
        }
        self.samples_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Push multiple samples into the buffer
    #[inline]
    pub fn push_slice(&mut self, samples: &[f32]) {
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            self.samples_dropped
                .fetch_add((samples.len() - pushed) as u64, Ordering::Release);
        }
        self.samples_written
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
    }
}

/// Consumer half (owned by the analyzer state on the frame thread)
pub struct SampleConsumer {
    consumer: ringbuf::HeapCons<f32>,
    samples_written: Arc<AtomicU64>,
    samples_dropped: Arc<AtomicU64>,
    dropped_seen: u64,
    overruns: u64,
    /// Most recent `capacity` samples, circular
    window: Vec<f32>,
    capacity: usize,
    write_pos: usize,
}

impl SampleConsumer {
    /// Drain everything the producer has pushed into the window.
    ///
    /// Call this once per frame before reading the window. If the producer
    /// dropped samples since the last call, the queued backlog and the
    /// window are stale and are cleared first.
    pub fn update(&mut self) {
        let dropped = self.samples_dropped.load(Ordering::Acquire);
        if dropped != self.dropped_seen {
            let stale = self.consumer.clear();
            log::debug!(
                "Sample ring overrun: {} dropped, {} stale discarded",
                dropped - self.dropped_seen,
                stale
            );
            self.dropped_seen = dropped;
            self.overruns += 1;
            self.window.iter_mut().for_each(|s| *s = 0.0);
            self.write_pos = 0;
        }

        while let Some(sample) = self.consumer.try_pop() {
            self.window[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Copy the window into `out` in chronological order (oldest first).
    ///
    /// `out` must be as long as the window. Until the window has filled the
    /// oldest entries are zero.
    pub fn copy_window(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.capacity);
        let (newer, older) = self.window.split_at(self.write_pos);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
    }

    /// Total samples pushed by the producer (for statistics)
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    /// Number of times a stale backlog was discarded
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
