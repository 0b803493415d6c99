//! Two-phase marker tween: rotate in place, then translate.

use crate::geo;
use crate::types::LatLng;
use std::f64::consts::PI;

/// Smoothstep-style ease, `t` in [0, 1].
pub fn ease(t: f64) -> f64 {
    0.5 - (PI * t.clamp(0.0, 1.0)).cos() / 2.0
}

/// Icon rotation for travelling from `from` to `to`. The icon artwork faces
/// east, hence the -90.
pub fn bearing_degrees(from: LatLng, to: LatLng) -> f64 {
    (to.lng - from.lng).atan2(to.lat - from.lat).to_degrees() - 90.0
}

/// Rotation target equivalent to `target` that is at most 180 degrees away
/// from `current`.
pub fn shortest_arc_target(current: f64, target: f64) -> f64 {
    let mut delta = (target - current) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    current + delta
}

/// Wrap into [0, 360).
pub fn normalize_degrees(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Interpolated marker pose at some instant of a tween.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: LatLng,
    pub rotation: f64,
}

/// A running position+rotation animation.
#[derive(Clone, Debug, PartialEq)]
pub struct Tween {
    pub started_at: u64,
    pub from: Pose,
    pub to: Pose,
    pub rotate_ms: f64,
    pub move_ms: f64,
}

impl Tween {
    /// Tween from `from` to `target` over an update interval split into a
    /// rotation share and a translation share.
    pub fn new(
        started_at: u64,
        from: Pose,
        target: LatLng,
        interval_ms: f64,
        rotation_phase: f64,
        translation_phase: f64,
    ) -> Self {
        // no heading for a zero-length move
        let rotation = if from.position == target {
            from.rotation
        } else {
            shortest_arc_target(from.rotation, bearing_degrees(from.position, target))
        };
        Self {
            started_at,
            from,
            to: Pose {
                position: target,
                rotation,
            },
            rotate_ms: (interval_ms * rotation_phase).max(0.0),
            move_ms: (interval_ms * translation_phase).max(0.0),
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.rotate_ms + self.move_ms
    }

    /// Pose at time `now`.
    pub fn sample(&self, now: u64) -> Pose {
        let elapsed = now.saturating_sub(self.started_at) as f64;
        let rotation = if elapsed >= self.rotate_ms {
            self.to.rotation
        } else {
            let k = ease(elapsed / self.rotate_ms);
            self.from.rotation + (self.to.rotation - self.from.rotation) * k
        };
        let moved = elapsed - self.rotate_ms;
        let position = if moved <= 0.0 {
            self.from.position
        } else if moved >= self.move_ms {
            self.to.position
        } else {
            geo::lerp(self.from.position, self.to.position, ease(moved / self.move_ms))
        };
        Pose { position, rotation }
    }

    /// First whole millisecond at which the tween is complete.
    pub fn ends_at(&self) -> u64 {
        self.started_at + self.duration_ms().ceil() as u64
    }

    pub fn is_finished(&self, now: u64) -> bool {
        now.saturating_sub(self.started_at) as f64 >= self.duration_ms()
    }
}
