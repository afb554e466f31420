//! Room transition slide and screen shake.
//!
//! Both effects produce a pixel offset for the whole scene; the controller
//! returns their sum. A room transition is two timed halves:
//!
//! ```text
//!  None ──start──▶ SlideOut ──progress≥1──▶ SlideIn ──progress≥1──▶ None
//!                  0 → -dir·dim              +dir·dim → 0
//! ```
//!
//! Shake is independent: a decaying two-axis sine jitter. Its phase comes
//! from a time value passed in by the caller, so results are reproducible.

use crawl_shared::{
    config::TransitionTuning,
    math::{Direction, RoomCoords, Vec2},
};

/// Angular frequency of the horizontal shake wave, rad/s.
const SHAKE_FREQ_X: f64 = 50.0;
/// Angular frequency of the vertical shake wave, rad/s.
const SHAKE_FREQ_Y: f64 = 70.0;

/// Quadratic ease-in-out on `[0, 1]`.
pub fn ease_in_out_quad(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        let u = 1.0 - t;
        1.0 - 2.0 * u * u
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPhase {
    #[default]
    None,
    SlideOut,
    SlideIn,
}

#[derive(Debug, Clone, Copy, Default)]
struct TransitionState {
    phase: TransitionPhase,
    progress: f32,
    direction: Direction,
}

#[derive(Debug, Clone, Copy)]
struct ShakeState {
    intensity: f32,
    remaining: f32,
    total: f32,
}

/// Scene offset controller.
#[derive(Debug, Default)]
pub struct TransitionController {
    transition: TransitionState,
    shake: Option<ShakeState>,
    tuning: TransitionTuning,
}

impl TransitionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tuning(tuning: TransitionTuning) -> Self {
        Self {
            tuning,
            ..Self::default()
        }
    }

    pub fn tuning(&self) -> &TransitionTuning {
        &self.tuning
    }

    /// Starts a slide from `from` toward `to`.
    ///
    /// Same-room calls are ignored. A call during a running transition
    /// restarts it with the new direction.
    pub fn start_transition(&mut self, from: RoomCoords, to: RoomCoords) {
        let direction = Direction::between(from, to);
        if direction.is_zero() {
            return;
        }
        self.transition = TransitionState {
            phase: TransitionPhase::SlideOut,
            progress: 0.0,
            direction,
        };
    }

    /// Starts a shake. `intensity` is clamped to `[0, 1]`; `duration`
    /// defaults to the tuning's default shake length.
    pub fn start_shake(&mut self, intensity: f32, duration: Option<f32>) {
        let duration = duration.unwrap_or(self.tuning.default_shake_secs);
        if duration <= 0.0 {
            self.shake = None;
            return;
        }
        self.shake = Some(ShakeState {
            intensity: intensity.clamp(0.0, 1.0),
            remaining: duration,
            total: duration,
        });
    }

    /// Advances both effects by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.update_transition(dt);

        if let Some(shake) = self.shake.as_mut() {
            shake.remaining -= dt;
            if shake.remaining <= 0.0 {
                self.shake = None;
            }
        }
    }

    fn update_transition(&mut self, dt: f32) {
        let t = &mut self.transition;
        if t.phase == TransitionPhase::None {
            return;
        }
        t.progress += dt / self.tuning.phase_secs;
        if t.progress < 1.0 {
            return;
        }
        match t.phase {
            TransitionPhase::SlideOut => {
                t.phase = TransitionPhase::SlideIn;
                t.progress = 0.0;
            }
            TransitionPhase::SlideIn => *t = TransitionState::default(),
            TransitionPhase::None => {}
        }
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.phase != TransitionPhase::None
    }

    pub fn is_shaking(&self) -> bool {
        self.shake.is_some()
    }

    pub fn phase(&self) -> TransitionPhase {
        self.transition.phase
    }

    pub fn progress(&self) -> f32 {
        self.transition.progress
    }

    pub fn direction(&self) -> Direction {
        self.transition.direction
    }

    /// Slide offset alone.
    pub fn transition_offset(&self) -> Vec2 {
        let t = &self.transition;
        let d = t.direction.as_vec2();
        let full = Vec2::new(d.x * self.tuning.room_width, d.y * self.tuning.room_height);
        match t.phase {
            TransitionPhase::None => Vec2::ZERO,
            TransitionPhase::SlideOut => -full * ease_in_out_quad(t.progress),
            TransitionPhase::SlideIn => full * (1.0 - ease_in_out_quad(t.progress)),
        }
    }

    /// Shake offset alone, evaluated at `time` seconds.
    pub fn shake_offset(&self, time: f64) -> Vec2 {
        let Some(shake) = self.shake else {
            return Vec2::ZERO;
        };
        let decay = shake.remaining / shake.total;
        let magnitude = self.tuning.max_shake_offset * shake.intensity * decay;
        Vec2::new(
            (time * SHAKE_FREQ_X).sin() as f32 * magnitude,
            (time * SHAKE_FREQ_Y).cos() as f32 * magnitude,
        )
    }

    /// Combined scene offset at `time` seconds.
    pub fn offset(&self, time: f64) -> Vec2 {
        self.transition_offset() + self.shake_offset(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(x: i32, y: i32) -> RoomCoords {
        RoomCoords::new(x, y)
    }

    #[test]
    fn ease_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert_eq!(ease_in_out_quad(0.5), 0.5);
        assert_eq!(ease_in_out_quad(1.0), 1.0);
        assert_eq!(ease_in_out_quad(0.25), 0.125);
    }

    #[test]
    fn full_transition_cycle() {
        let mut c = TransitionController::new();
        c.start_transition(room(0, 0), room(1, 0));
        assert_eq!(c.phase(), TransitionPhase::SlideOut);
        assert_eq!(c.direction(), Direction { x: 1, y: 0 });
        assert!(c.is_transitioning());

        c.update(0.15);
        assert_eq!(c.phase(), TransitionPhase::SlideIn);
        assert_eq!(c.progress(), 0.0);

        c.update(0.15);
        assert!(!c.is_transitioning());
        assert_eq!(c.phase(), TransitionPhase::None);
        assert_eq!(c.direction(), Direction::NONE);
        assert_eq!(c.offset(12.5), Vec2::ZERO);
    }

    #[test]
    fn phases_meet_at_full_room_offset() {
        let mut c = TransitionController::new();
        let width = c.tuning().room_width;
        c.start_transition(room(0, 0), room(1, 0));
        c.update(0.15);
        assert_eq!(c.offset(0.0).x, width);
        assert_eq!(c.offset(0.0).y, 0.0);
    }

    #[test]
    fn slide_out_moves_against_travel() {
        let mut c = TransitionController::new();
        let height = c.tuning().room_height;
        c.start_transition(room(4, 4), room(4, 2));
        assert_eq!(c.offset(0.0), Vec2::ZERO);
        c.update(0.075);
        let off = c.offset(0.0);
        assert_eq!(off.x, 0.0);
        // halfway through the ease: -dir.y * height * 0.5 with dir.y = -1
        assert!((off.y - height * 0.5).abs() < 1e-3, "y = {}", off.y);
    }

    #[test]
    fn slide_in_returns_to_zero() {
        let mut c = TransitionController::new();
        let width = c.tuning().room_width;
        c.start_transition(room(1, 0), room(0, 0));
        c.update(0.15);
        assert_eq!(c.offset(0.0).x, -width);
        c.update(0.075);
        assert!((c.offset(0.0).x + width * 0.5).abs() < 1e-3);
        c.update(0.075);
        assert_eq!(c.offset(0.0), Vec2::ZERO);
    }

    #[test]
    fn zero_direction_is_a_no_op() {
        let mut c = TransitionController::new();
        c.start_transition(room(0, 0), room(0, 0));
        assert!(!c.is_transitioning());
        assert_eq!(c.offset(1.0), Vec2::ZERO);
    }

    #[test]
    fn restart_replaces_direction() {
        let mut c = TransitionController::new();
        c.start_transition(room(0, 0), room(1, 0));
        c.update(0.1);
        c.start_transition(room(1, 0), room(1, 1));
        assert_eq!(c.phase(), TransitionPhase::SlideOut);
        assert_eq!(c.progress(), 0.0);
        assert_eq!(c.direction(), Direction { x: 0, y: 1 });
    }

    #[test]
    fn shake_decays_and_expires() {
        let mut c = TransitionController::new();
        c.start_shake(3.0, None);
        assert!(c.is_shaking());

        // sin(50t) peaks at t = pi/100.
        let peak = std::f64::consts::PI / 100.0;
        let first = c.shake_offset(peak).x;
        assert!((first - 8.0).abs() < 1e-3, "clamped intensity, full decay: {first}");

        c.update(0.15);
        let half = c.shake_offset(peak).x;
        assert!((half - 4.0).abs() < 1e-3, "half decayed: {half}");

        c.update(0.15);
        assert!(!c.is_shaking());
        assert_eq!(c.shake_offset(peak), Vec2::ZERO);
    }

    #[test]
    fn shake_is_deterministic_for_a_given_time() {
        let mut c = TransitionController::new();
        c.start_shake(0.5, Some(1.0));
        assert_eq!(c.shake_offset(3.21), c.shake_offset(3.21));
        assert!(c.shake_offset(0.0).y.abs() > 0.0);
    }

    #[test]
    fn effects_compose_additively() {
        let mut c = TransitionController::new();
        c.start_transition(room(0, 0), room(1, 0));
        c.update(0.15);
        c.start_shake(1.0, Some(1.0));
        let t = 0.77;
        assert_eq!(c.offset(t), c.transition_offset() + c.shake_offset(t));
        assert_ne!(c.offset(t), c.transition_offset());
    }
}
