//! Cooperative render loop: decides on each display refresh whether a frame is drawn.

use tracing::debug;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No continuous drawing; single frames only on request
    Idle,
    /// Drawing every refresh while playing or recording
    Running,
    /// Torn down; never draws again
    Stopped,
}

/// Drives frame rendering from the refresh signal.
///
/// The loop runs only while the session plays or records. Leaving that state
/// produces exactly one settling frame, after which refreshes are ignored
/// until something requests another frame.
#[derive(Debug)]
pub struct RenderLoopScheduler {
    state: SchedulerState,
    frame_pending: bool,
    frames_drawn: u64,
}

impl RenderLoopScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            // Initial preview frame
            frame_pending: true,
            frames_drawn: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Follow the session's activity; call after every playback or capture transition
    pub fn update(&mut self, playing: bool, recording: bool) {
        let active = playing || recording;
        match (self.state, active) {
            (SchedulerState::Idle, true) => {
                debug!("Render loop started");
                self.state = SchedulerState::Running;
                self.frame_pending = true;
            }
            (SchedulerState::Running, false) => {
                debug!("Render loop idle after settling frame");
                self.state = SchedulerState::Idle;
                self.frame_pending = true;
            }
            _ => {}
        }
    }

    /// Ask for one out-of-band frame, e.g. after a seek while paused
    pub fn request_frame(&mut self) {
        if self.state != SchedulerState::Stopped {
            self.frame_pending = true;
        }
    }

    /// Visualization mode or other render config changed
    pub fn on_config_changed(&mut self) {
        self.request_frame();
    }

    /// Whether the refresh signal needs to be delivered at all
    pub fn wants_refresh(&self) -> bool {
        match self.state {
            SchedulerState::Running => true,
            SchedulerState::Idle => self.frame_pending,
            SchedulerState::Stopped => false,
        }
    }

    /// Called on each display refresh; returns true when a frame should be drawn
    pub fn on_refresh(&mut self) -> bool {
        let draw = self.wants_refresh();
        if draw {
            self.frame_pending = false;
            self.frames_drawn += 1;
        }
        draw
    }

    /// Stop scheduling permanently
    pub fn stop(&mut self) {
        if self.state != SchedulerState::Stopped {
            debug!("Render loop stopped after {} frames", self.frames_drawn);
        }
        self.state = SchedulerState::Stopped;
        self.frame_pending = false;
    }
}

impl Default for RenderLoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut RenderLoopScheduler, refreshes: usize) -> usize {
        (0..refreshes).filter(|_| scheduler.on_refresh()).count()
    }

    #[test]
    fn test_idle_draws_initial_frame_then_rests() {
        let mut scheduler = RenderLoopScheduler::new();
        assert_eq!(drain(&mut scheduler, 10), 1);
        assert!(!scheduler.wants_refresh());
    }

    #[test]
    fn test_running_draws_every_refresh() {
        let mut scheduler = RenderLoopScheduler::new();
        scheduler.update(true, false);
        assert!(scheduler.is_running());
        assert_eq!(drain(&mut scheduler, 60), 60);
    }

    #[test]
    fn test_pause_renders_exactly_one_settling_frame() {
        let mut scheduler = RenderLoopScheduler::new();
        scheduler.update(true, false);
        drain(&mut scheduler, 5);

        scheduler.update(false, false);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(drain(&mut scheduler, 30), 1);
    }

    #[test]
    fn test_recording_keeps_loop_running() {
        let mut scheduler = RenderLoopScheduler::new();
        scheduler.update(false, true);
        assert!(scheduler.is_running());

        // Playback stopping mid-recording does not idle the loop
        scheduler.update(false, true);
        assert_eq!(drain(&mut scheduler, 3), 3);
    }

    #[test]
    fn test_request_frame_while_idle() {
        let mut scheduler = RenderLoopScheduler::new();
        drain(&mut scheduler, 1);

        scheduler.request_frame();
        scheduler.on_config_changed();
        assert_eq!(drain(&mut scheduler, 5), 1);
    }

    #[test]
    fn test_stop_is_final() {
        let mut scheduler = RenderLoopScheduler::new();
        scheduler.update(true, false);
        scheduler.stop();
        scheduler.stop();

        scheduler.update(true, true);
        scheduler.request_frame();
        assert!(!scheduler.wants_refresh());
        assert_eq!(drain(&mut scheduler, 5), 0);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
