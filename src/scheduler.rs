//! Frame-paced scheduling
//!
//! The scheduler never sleeps or spins. While running it keeps exactly one
//! frame request outstanding with the host; the host calls back on its next
//! paint and the scheduler re-arms. Stopping cancels the outstanding request
//! and any late callback carrying its handle is ignored.

use std::time::Instant;

use eframe::egui;

use crate::audio::ConnectionState;
use crate::error::PipelineError;

/// Identifies one outstanding frame request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Host primitive that invokes the scheduler on the next display frame
pub trait FrameRequester {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Requests frames through the egui repaint cycle.
///
/// egui cannot withdraw a repaint request, so a cancelled frame still
/// repaints once; the scheduler drops it because its handle is stale.
pub struct RepaintRequester {
    ctx: egui::Context,
    next: u64,
}

impl RepaintRequester {
    pub fn new(ctx: egui::Context) -> Self {
        Self { ctx, next: 0 }
    }
}

impl FrameRequester for RepaintRequester {
    fn request_frame(&mut self) -> FrameHandle {
        self.next += 1;
        self.ctx.request_repaint();
        FrameHandle(self.next)
    }

    fn cancel_frame(&mut self, _handle: FrameHandle) {}
}

/// Seconds since the pipeline clock started
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct FrameTimestamp(pub f32);

impl FrameTimestamp {
    pub fn seconds(self) -> f32 {
        self.0
    }
}

/// Single writer of frame timestamps
pub struct FrameClock {
    start: Instant,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> FrameTimestamp {
        FrameTimestamp(self.start.elapsed().as_secs_f32())
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub started: u64,
    pub stopped: u64,
    pub ticks: u64,
}

/// Cooperative once-per-frame loop
pub struct FrameScheduler<R: FrameRequester> {
    requester: R,
    state: SchedulerState,
    pending: Option<FrameHandle>,
    stats: SchedulerStats,
}

impl<R: FrameRequester> FrameScheduler<R> {
    pub fn new(requester: R) -> Self {
        Self {
            requester,
            state: SchedulerState::Idle,
            pending: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Handle of the outstanding frame request, if any
    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Idle -> Running. Only permitted while a device is connected.
    pub fn start(&mut self, connection: ConnectionState) -> Result<(), PipelineError> {
        if connection != ConnectionState::Connected {
            return Err(PipelineError::NotConnected);
        }
        if self.is_running() {
            return Ok(());
        }

        self.state = SchedulerState::Running;
        self.stats.started += 1;
        self.arm();
        log::info!("Frame loop started");
        Ok(())
    }

    /// Running -> Idle, cancelling the outstanding request
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.requester.cancel_frame(handle);
        }
        if self.is_running() {
            self.state = SchedulerState::Idle;
            self.stats.stopped += 1;
            log::info!("Frame loop stopped after {} ticks", self.stats.ticks);
        }
    }

    /// Accept a host callback. Returns false for stale or cancelled handles.
    pub fn begin_tick(&mut self, handle: FrameHandle) -> bool {
        if !self.is_running() || self.pending != Some(handle) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Finish an accepted tick and request the next frame
    pub fn end_tick(&mut self) {
        self.stats.ticks += 1;
        if self.is_running() {
            self.arm();
        }
    }

    fn arm(&mut self) {
        if let Some(stale) = self.pending.take() {
            self.requester.cancel_frame(stale);
        }
        self.pending = Some(self.requester.request_frame());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Frame requester driven by hand from tests
    #[derive(Clone, Default)]
    pub struct ManualFrames {
        pub log: Rc<RefCell<FrameLog>>,
    }

    #[derive(Default)]
    pub struct FrameLog {
        pub next: u64,
        pub requested: Vec<FrameHandle>,
        pub cancelled: Vec<FrameHandle>,
    }

    impl FrameRequester for ManualFrames {
        fn request_frame(&mut self) -> FrameHandle {
            let mut log = self.log.borrow_mut();
            log.next += 1;
            let handle = FrameHandle(log.next);
            log.requested.push(handle);
            handle
        }

        fn cancel_frame(&mut self, handle: FrameHandle) {
            self.log.borrow_mut().cancelled.push(handle);
        }
    }

    #[test]
    fn test_start_requires_connection() {
        let mut scheduler = FrameScheduler::new(ManualFrames::default());

        assert_eq!(
            scheduler.start(ConnectionState::Disconnected),
            Err(PipelineError::NotConnected)
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.pending().is_none());
    }

    #[test]
    fn test_start_is_idempotent() {
        let frames = ManualFrames::default();
        let mut scheduler = FrameScheduler::new(frames.clone());

        scheduler.start(ConnectionState::Connected).unwrap();
        scheduler.start(ConnectionState::Connected).unwrap();

        assert_eq!(scheduler.stats().started, 1);
        assert_eq!(frames.log.borrow().requested.len(), 1);
    }

    #[test]
    fn test_tick_rearms_once() {
        let frames = ManualFrames::default();
        let mut scheduler = FrameScheduler::new(frames.clone());
        scheduler.start(ConnectionState::Connected).unwrap();

        for _ in 0..5 {
            let handle = scheduler.pending().unwrap();
            assert!(scheduler.begin_tick(handle));
            assert!(scheduler.pending().is_none());
            scheduler.end_tick();
        }

        assert_eq!(scheduler.stats().ticks, 5);
        assert_eq!(frames.log.borrow().requested.len(), 6);
        assert!(scheduler.pending().is_some());
    }

    #[test]
    fn test_stop_cancels_pending() {
        let frames = ManualFrames::default();
        let mut scheduler = FrameScheduler::new(frames.clone());
        scheduler.start(ConnectionState::Connected).unwrap();
        let handle = scheduler.pending().unwrap();

        scheduler.stop();
        scheduler.stop();

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.stats().stopped, 1);
        assert_eq!(frames.log.borrow().cancelled, vec![handle]);
        assert!(!scheduler.begin_tick(handle));
    }

    #[test]
    fn test_stale_handle_ignored() {
        let mut scheduler = FrameScheduler::new(ManualFrames::default());
        scheduler.start(ConnectionState::Connected).unwrap();
        let first = scheduler.pending().unwrap();
        assert!(scheduler.begin_tick(first));
        scheduler.end_tick();

        assert!(!scheduler.begin_tick(first));
        assert_eq!(scheduler.stats().ticks, 1);
    }

    #[test]
    fn test_frame_clock_is_monotonic() {
        let clock = FrameClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a.seconds() >= 0.0);
    }
}
