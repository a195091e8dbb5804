use std::f64::consts::{FRAC_PI_2, TAU};

use kurbo::{Point, Vec2};

/// Mirror of the live audio element. `duration` is only meaningful after
/// metadata has loaded; every derivation below guards the zero case.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackState {
    pub current: f64,
    pub duration: f64,
    pub playing: bool,
}

impl PlaybackState {
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn metadata_loaded(&mut self, duration: f64) {
        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    }

    pub fn time_update(&mut self, current: f64) {
        self.current = current.max(0.0);
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn ended(&mut self) {
        self.playing = false;
    }

    /// Pause and rewind to the start (used when a regeneration begins).
    pub fn rewind(&mut self) {
        self.playing = false;
        self.current = 0.0;
    }

    /// Jump to a progress fraction. No-op until metadata is loaded.
    pub fn seek_to_progress(&mut self, progress: f64) {
        if self.duration > 0.0 {
            self.current = progress.clamp(0.0, 1.0) * self.duration;
        }
    }

    /// Seek from a click at `offset` relative to the circular scrubber's
    /// center.
    pub fn seek_from_click(&mut self, offset: Vec2) {
        self.seek_to_progress(seek_progress(offset));
    }
}

/// Angle of the progress marker on the ring; 12 o'clock is the start.
pub fn ring_angle(progress: f64) -> f64 {
    -FRAC_PI_2 + TAU * progress.clamp(0.0, 1.0)
}

/// Marker position on a ring of `radius` around `center`.
pub fn marker_position(center: Point, radius: f64, progress: f64) -> Point {
    let theta = ring_angle(progress);
    Point::new(
        center.x + radius * theta.cos(),
        center.y + radius * theta.sin(),
    )
}

/// Map a click offset (relative to the scrubber center, +y down as in
/// screen coordinates) to a progress fraction in `[0, 1)`.
pub fn seek_progress(offset: Vec2) -> f64 {
    let angle = offset.y.atan2(offset.x) + FRAC_PI_2;
    let normalized = if angle < 0.0 { angle + TAU } else { angle };
    normalized / TAU
}

/// Seconds as `M:SS` with zero-padded seconds.
pub fn format_clock(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let total = secs.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
