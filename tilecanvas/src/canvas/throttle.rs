//! Render snapshot throttling.

use std::time::Duration;

use tokio::time::Instant;

/// Default minimum interval between two published snapshots (about 55 fps).
pub const DEFAULT_RENDER_THROTTLE: Duration = Duration::from_millis(18);

/// Limits how often the render snapshot is rebuilt.
///
/// Changes mark the throttle dirty; a render is due once the interval since
/// the previous render has elapsed. A burst of changes inside one interval
/// yields a single render at its end.
#[derive(Debug)]
pub(crate) struct RenderThrottle {
    interval: Duration,
    last_render: Option<Instant>,
    dirty: bool,
}

impl RenderThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
            dirty: false,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Earliest instant the pending render may run, if one is pending.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }
        Some(match self.last_render {
            Some(last) => last + self.interval,
            None => Instant::now(),
        })
    }

    /// Returns true, and records the render, if a render is due at `now`.
    pub(crate) fn try_render(&mut self, now: Instant) -> bool {
        if !self.dirty {
            return false;
        }
        if let Some(last) = self.last_render {
            if now < last + self.interval {
                return false;
            }
        }
        self.dirty = false;
        self.last_render = Some(now);
        true
    }
}
