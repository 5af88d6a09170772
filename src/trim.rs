//! Selection of the 30-second window that gets recorded.

use tracing::debug;

use crate::audio::graph::AudioGraph;
use crate::config::CAP_SECONDS;
use crate::error::{Result, StateError};
use crate::scheduler::RenderLoopScheduler;

/// The recorded sub-range of the track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start_offset: f64,
    pub cap_seconds: f64,
}

impl TrimWindow {
    pub fn new() -> Self {
        Self { start_offset: 0.0, cap_seconds: CAP_SECONDS }
    }

    /// Latest allowed start for a track of `duration` seconds
    pub fn max_start(&self, duration: f64) -> f64 {
        (duration - self.cap_seconds).max(0.0)
    }

    /// Clamp a requested start into `[0, max(0, duration - cap)]`
    pub fn clamp(&self, requested: f64, duration: f64) -> f64 {
        if !requested.is_finite() {
            return 0.0;
        }
        requested.clamp(0.0, self.max_start(duration))
    }

    /// End of the window, never past the end of the track
    pub fn end(&self, duration: f64) -> f64 {
        (self.start_offset + self.cap_seconds).min(duration)
    }
}

impl Default for TrimWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Format seconds as `m:ss`
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Applies user-chosen start offsets to the audio cursor
#[derive(Debug, Default)]
pub struct TrimSelector {
    window: TrimWindow,
}

impl TrimSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> TrimWindow {
        self.window
    }

    pub fn start_offset(&self) -> f64 {
        self.window.start_offset
    }

    /// Clamp `offset`, seek the graph there and request a preview frame.
    ///
    /// Rejected while a recording is active.
    pub fn set_start(
        &mut self,
        offset: f64,
        graph: &mut AudioGraph,
        scheduler: &mut RenderLoopScheduler,
        recording: bool,
    ) -> Result<f64> {
        if recording {
            return Err(StateError::TrimLocked.into());
        }

        let duration = graph.duration().unwrap_or(0.0);
        let start = self.window.clamp(offset, duration);
        graph.seek(start)?;
        self.window.start_offset = start;
        scheduler.request_frame();

        debug!(
            "Trim window {} - {}",
            format_timestamp(start),
            format_timestamp(self.window.end(duration))
        );
        Ok(start)
    }

    /// Re-clamp after the track changed
    pub fn reset_for(&mut self, duration: f64) {
        self.window.start_offset = self.window.clamp(self.window.start_offset, duration);
    }

    /// Start and end labels for the current window
    pub fn labels(&self, duration: f64) -> (String, String) {
        (format_timestamp(self.window.start_offset), format_timestamp(self.window.end(duration)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::tests::open_graph;
    use crate::clock::ManualClock;
    use crate::error::ReelError;

    #[test]
    fn test_clamp_property() {
        let window = TrimWindow::new();
        for duration in [0.0, 5.0, 29.9, 30.0, 31.0, 40.0, 180.0] {
            for requested in [-10.0, 0.0, 3.0, 10.0, 20.0, 75.0, 500.0] {
                let applied = window.clamp(requested, duration);
                let expected = requested.clamp(0.0, (duration - 30.0_f64).max(0.0));
                assert_eq!(applied, expected, "D={} s={}", duration, requested);

                let placed = TrimWindow { start_offset: applied, ..window };
                assert_eq!(placed.end(duration), (applied + 30.0).min(duration));
                if duration > 30.0 {
                    assert!(applied + 30.0 <= duration);
                } else {
                    assert_eq!(applied, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_forty_second_track_scenario() {
        let clock = ManualClock::new();
        let mut graph = open_graph(&clock, 40.0);
        let mut scheduler = RenderLoopScheduler::new();
        scheduler.on_refresh();

        let mut selector = TrimSelector::new();
        let start = selector.set_start(20.0, &mut graph, &mut scheduler, false).unwrap();

        assert_eq!(start, 10.0);
        assert_eq!(graph.cursor(), 10.0);
        assert_eq!(selector.window().end(40.0), 40.0);
        assert_eq!(selector.labels(40.0), ("0:10".to_string(), "0:40".to_string()));
        // Paused preview still gets a frame
        assert!(scheduler.on_refresh());
    }

    #[test]
    fn test_locked_while_recording() {
        let clock = ManualClock::new();
        let mut graph = open_graph(&clock, 90.0);
        let mut scheduler = RenderLoopScheduler::new();
        let mut selector = TrimSelector::new();
        selector.set_start(12.0, &mut graph, &mut scheduler, false).unwrap();

        let result = selector.set_start(40.0, &mut graph, &mut scheduler, true);
        assert!(matches!(result, Err(ReelError::State(StateError::TrimLocked))));
        assert_eq!(selector.start_offset(), 12.0);
        assert_eq!(graph.cursor(), 12.0);
    }

    #[test]
    fn test_short_track_always_starts_at_zero() {
        let clock = ManualClock::new();
        let mut graph = open_graph(&clock, 12.0);
        let mut scheduler = RenderLoopScheduler::new();
        let mut selector = TrimSelector::new();

        assert_eq!(selector.set_start(5.0, &mut graph, &mut scheduler, false).unwrap(), 0.0);
        assert_eq!(selector.window().end(12.0), 12.0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(9.99), "0:09");
        assert_eq!(format_timestamp(75.0), "1:15");
        assert_eq!(format_timestamp(-3.0), "0:00");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
    }
}
