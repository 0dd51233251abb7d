//! Capture-to-parameter pipeline
//!
//! One tick samples the spectrum, reduces it and publishes the result to
//! every sink. The frame is built completely before any sink sees it.

use crate::audio::{
    AnalyzerConfig, AnalyzerState, CaptureBackend, DeviceConnection, SpectrumSampler,
};
use crate::error::PipelineError;
use crate::features::{self, FeatureVector};
use crate::scheduler::{
    FrameHandle, FrameRequester, FrameScheduler, FrameTimestamp, SchedulerState, SchedulerStats,
};

/// Unit of publication: one reduced spectrum and when it was taken
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub vector: FeatureVector,
    pub time: FrameTimestamp,
}

/// Consumer of published frames
pub trait FrameSink {
    fn publish(&mut self, frame: &FeatureFrame) -> Result<(), PipelineError>;
}

/// Device connection, analyzer and frame loop wired together
pub struct Visualizer<B: CaptureBackend, R: FrameRequester> {
    connection: DeviceConnection<B>,
    sampler: SpectrumSampler,
    analyzer: AnalyzerState,
    scheduler: FrameScheduler<R>,
    bin_count: usize,
    latest: Option<FeatureFrame>,
}

impl<B: CaptureBackend, R: FrameRequester> Visualizer<B, R> {
    /// Fails if the analyzer cannot produce `bin_count` non-empty slots
    pub fn new(
        backend: B,
        requester: R,
        config: AnalyzerConfig,
        bin_count: usize,
    ) -> Result<Self, PipelineError> {
        let sampler = SpectrumSampler::new(config)?;
        features::bucket_ranges(config.spectrum_len(), bin_count)?;

        Ok(Self {
            connection: DeviceConnection::new(backend, config.fft_size),
            sampler,
            analyzer: AnalyzerState::new(&config),
            scheduler: FrameScheduler::new(requester),
            bin_count,
            latest: None,
        })
    }

    /// The user trigger: connect when disconnected, otherwise disconnect
    pub fn toggle(&mut self) -> Result<(), PipelineError> {
        self.connection
            .toggle(&mut self.analyzer, &mut self.scheduler)
    }

    /// Stop the loop and release the device
    pub fn disconnect(&mut self) {
        self.connection
            .disconnect(&mut self.analyzer, &mut self.scheduler);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &DeviceConnection<B> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut DeviceConnection<B> {
        &mut self.connection
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn analyzer(&self) -> &AnalyzerState {
        &self.analyzer
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Handle the host should call back with on its next frame
    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.scheduler.pending()
    }

    /// Run one scheduled tick.
    ///
    /// Returns `Ok(None)` when the handle is stale or no device is bound.
    /// Errors are invariant violations: the sampler or reducer was reached
    /// with a configuration that startup validation should have rejected.
    /// The next frame is requested either way, so the loop keeps running
    /// until `disconnect`.
    pub fn on_frame(
        &mut self,
        handle: FrameHandle,
        time: FrameTimestamp,
        sinks: &mut [&mut dyn FrameSink],
    ) -> Result<Option<&FeatureFrame>, PipelineError> {
        if !self.scheduler.begin_tick(handle) {
            return Ok(None);
        }

        // A disconnect always stops the loop itself; just skip the work here
        if !self.connection.is_connected() {
            self.scheduler.end_tick();
            return Ok(None);
        }

        let published = self.publish_frame(time, sinks);
        self.scheduler.end_tick();
        published?;

        Ok(self.latest.as_ref())
    }

    /// `latest` only moves once every sink accepted the frame
    fn publish_frame(
        &mut self,
        time: FrameTimestamp,
        sinks: &mut [&mut dyn FrameSink],
    ) -> Result<(), PipelineError> {
        let spectrum = self.sampler.sample(&mut self.analyzer)?;
        let vector = features::reduce(spectrum.as_slice(), self.bin_count)?;
        let frame = FeatureFrame { vector, time };

        for sink in sinks.iter_mut() {
            sink.publish(&frame)?;
        }
        self.latest = Some(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ConnectionState, FakeBackend};
    use crate::scheduler::tests::ManualFrames;
    use std::f32::consts::PI;

    /// Sink that remembers everything it was handed
    #[derive(Default)]
    struct Recorder {
        frames: Vec<FeatureFrame>,
    }

    impl FrameSink for Recorder {
        fn publish(&mut self, frame: &FeatureFrame) -> Result<(), PipelineError> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    /// Sink that rejects every frame
    struct Rejecting;

    impl FrameSink for Rejecting {
        fn publish(&mut self, frame: &FeatureFrame) -> Result<(), PipelineError> {
            Err(PipelineError::MissingFeatureSlot {
                slot: 30,
                len: frame.vector.len(),
            })
        }
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: 512,
            smoothing: 0.0,
            ..AnalyzerConfig::default()
        }
    }

    fn visualizer(backend: FakeBackend) -> Visualizer<FakeBackend, ManualFrames> {
        Visualizer::new(backend, ManualFrames::default(), config(), 20).unwrap()
    }

    /// Fire the pending frame, if any
    fn tick(
        v: &mut Visualizer<FakeBackend, ManualFrames>,
        time: f32,
        recorder: &mut Recorder,
    ) -> bool {
        match v.pending_frame() {
            Some(handle) => v
                .on_frame(handle, FrameTimestamp(time), &mut [recorder])
                .unwrap()
                .is_some(),
            None => false,
        }
    }

    #[test]
    fn test_ticks_publish_frames() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut recorder = Recorder::default();

        v.toggle().unwrap();
        for i in 0..3 {
            backend.feed(&[0.0; 128]);
            assert!(tick(&mut v, i as f32 / 60.0, &mut recorder));
        }

        assert_eq!(recorder.frames.len(), 3);
        assert!(recorder.frames.iter().all(|f| f.vector.len() == 20));
        assert_eq!(recorder.frames[2].time, FrameTimestamp(2.0 / 60.0));
        assert_eq!(v.analyzer().passes(), 3);
        assert_eq!(v.stats().ticks, 3);
    }

    #[test]
    fn test_tone_reaches_expected_slot() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut recorder = Recorder::default();
        v.toggle().unwrap();

        // 256 buckets over 20 slots: bucket 40 sits in slot 40 / 12 = 3
        let tone: Vec<f32> = (0..512)
            .map(|i| (2.0 * PI * 40.0 * i as f32 / 512.0).sin())
            .collect();
        backend.feed(&tone);
        assert!(tick(&mut v, 0.0, &mut recorder));

        let slots = recorder.frames[0].vector.as_slice();
        let loudest = (0..slots.len()).max_by_key(|&i| slots[i]).unwrap();
        assert_eq!(loudest, 3);
    }

    #[test]
    fn test_no_sampling_after_disconnect() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut recorder = Recorder::default();

        v.toggle().unwrap();
        assert!(tick(&mut v, 0.0, &mut recorder));
        let stale = v.pending_frame().unwrap();
        v.disconnect();

        for i in 0..10 {
            backend.feed(&[0.5; 64]);
            assert!(!tick(&mut v, i as f32, &mut recorder));
            // A repaint already in flight for the cancelled request
            assert!(v
                .on_frame(stale, FrameTimestamp(i as f32), &mut [&mut recorder])
                .unwrap()
                .is_none());
        }

        assert_eq!(v.analyzer().passes(), 1);
        assert_eq!(recorder.frames.len(), 1);
        assert_eq!(v.scheduler_state(), SchedulerState::Idle);
    }

    #[test]
    fn test_toggle_twice_starts_and_stops_once() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());

        v.toggle().unwrap();
        v.toggle().unwrap();

        assert_eq!(v.connection().state(), ConnectionState::Disconnected);
        assert_eq!(v.stats().started, 1);
        assert_eq!(v.stats().stopped, 1);
        assert!(v.pending_frame().is_none());
    }

    #[test]
    fn test_permission_denied_leaves_idle() {
        let backend = FakeBackend::failing(PipelineError::PermissionDenied("denied".into()));
        let mut v = visualizer(backend);
        let mut recorder = Recorder::default();

        assert!(v.toggle().unwrap_err().is_recoverable());
        assert_eq!(v.connection().state(), ConnectionState::Disconnected);
        assert_eq!(v.scheduler_state(), SchedulerState::Idle);
        assert!(!tick(&mut v, 0.0, &mut recorder));
        assert_eq!(v.analyzer().passes(), 0);
    }

    #[test]
    fn test_reconnect_resumes() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut recorder = Recorder::default();

        v.toggle().unwrap();
        assert!(tick(&mut v, 0.0, &mut recorder));
        v.toggle().unwrap();
        v.toggle().unwrap();
        assert!(tick(&mut v, 1.0, &mut recorder));

        assert_eq!(v.stats().started, 2);
        assert_eq!(backend.opened.borrow().len(), 2);
        assert_eq!(recorder.frames.len(), 2);
    }

    #[test]
    fn test_every_sink_sees_the_same_frame() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut first = Recorder::default();
        let mut second = Recorder::default();
        v.toggle().unwrap();
        backend.feed(&[0.25; 512]);

        let handle = v.pending_frame().unwrap();
        v.on_frame(handle, FrameTimestamp(0.5), &mut [&mut first, &mut second])
            .unwrap();

        assert_eq!(first.frames, second.frames);
        assert_eq!(first.frames.len(), 1);
    }

    #[test]
    fn test_failed_publish_keeps_loop_armed() {
        let backend = FakeBackend::default();
        let mut v = visualizer(backend.clone());
        let mut recorder = Recorder::default();
        v.toggle().unwrap();
        backend.feed(&[0.25; 512]);

        let handle = v.pending_frame().unwrap();
        let result = v.on_frame(
            handle,
            FrameTimestamp(0.0),
            &mut [&mut recorder, &mut Rejecting],
        );

        assert_eq!(
            result.err(),
            Some(PipelineError::MissingFeatureSlot { slot: 30, len: 20 })
        );
        assert_eq!(v.scheduler_state(), SchedulerState::Running);
        assert_eq!(v.stats().ticks, 1);

        let next = v.pending_frame().unwrap();
        assert_ne!(next, handle);
        let frame = v
            .on_frame(next, FrameTimestamp(1.0 / 60.0), &mut [&mut recorder])
            .unwrap()
            .cloned();
        assert_eq!(frame.as_ref(), recorder.frames.last());
        assert_eq!(recorder.frames.len(), 2);
    }

    #[test]
    fn test_bin_count_checked_at_startup() {
        let small = AnalyzerConfig {
            fft_size: 32,
            ..AnalyzerConfig::default()
        };
        let result = Visualizer::new(FakeBackend::default(), ManualFrames::default(), small, 20);
        assert!(matches!(
            result.err(),
            Some(PipelineError::InsufficientSpectrum { len: 16, bins: 20 })
        ));
    }
}
