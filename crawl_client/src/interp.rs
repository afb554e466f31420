//! Interpolation.
//!
//! The server sends discrete snapshots at its own tick rate.
//! The client renders at display rate and eases every entity toward its
//! latest authoritative position, snapping when the gap is too large to be
//! ordinary movement (room change, respawn).

use std::collections::HashMap;

use crawl_shared::{config::SmoothingTuning, math::Vec2, snapshot::EntityId};

/// Rendered and authoritative position of one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPosition {
    pub current: Vec2,
    pub target: Vec2,
}

/// Per-entity exponential smoothing toward the latest snapshot position.
#[derive(Debug, Default)]
pub struct PositionSmoother {
    entities: HashMap<EntityId, TrackedPosition>,
    tuning: SmoothingTuning,
}

impl PositionSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an authoritative position.
    ///
    /// An unseen entity starts at its target so it never slides in from an
    /// arbitrary origin. A known entity only gets a new target.
    pub fn set_target(&mut self, id: EntityId, x: f32, y: f32) {
        let target = Vec2::new(x, y);
        self.entities
            .entry(id)
            .and_modify(|p| p.target = target)
            .or_insert(TrackedPosition {
                current: target,
                target,
            });
    }

    /// Advances every entity by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let t = (self.tuning.rate * dt).min(1.0);
        for p in self.entities.values_mut() {
            if p.current.distance(p.target) > self.tuning.snap_distance {
                p.current = p.target;
            } else {
                p.current = p.current.lerp(p.target, t);
            }
        }
    }

    pub fn position(&self, id: EntityId) -> Option<TrackedPosition> {
        self.entities.get(&id).copied()
    }

    pub fn remove_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }

    /// Evicts every entity not accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        self.entities.retain(|id, _| keep(*id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &TrackedPosition)> {
        self.entities.iter().map(|(id, p)| (*id, p))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: EntityId = EntityId(3);

    #[test]
    fn new_entity_starts_at_target() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 12.0, -4.0);
        let p = s.position(ID).unwrap();
        assert_eq!(p.current, Vec2::new(12.0, -4.0));
        assert_eq!(p.target, p.current);
    }

    #[test]
    fn second_target_leaves_current_until_update() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 0.0, 0.0);
        s.set_target(ID, 50.0, 0.0);
        let p = s.position(ID).unwrap();
        assert_eq!(p.current, Vec2::ZERO);
        assert_eq!(p.target, Vec2::new(50.0, 0.0));
    }

    #[test]
    fn small_moves_are_smoothed() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 0.0, 0.0);
        s.set_target(ID, 100.0, 100.0);
        s.update(0.016);
        let x = s.position(ID).unwrap().current.x;
        assert!(x > 0.0 && x < 100.0, "x = {x}");
        // t = 15 * 0.016
        assert!((x - 24.0).abs() < 1e-3);
    }

    #[test]
    fn large_jumps_snap() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 0.0, 0.0);
        s.set_target(ID, 1000.0, 0.0);
        s.update(0.016);
        assert_eq!(s.position(ID).unwrap().current, Vec2::new(1000.0, 0.0));
    }

    #[test]
    fn huge_dt_lands_exactly_without_overshoot() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 0.0, 0.0);
        s.set_target(ID, 30.0, 40.0);
        s.update(5.0);
        assert_eq!(s.position(ID).unwrap().current, Vec2::new(30.0, 40.0));
    }

    #[test]
    fn smaller_dt_takes_smaller_steps() {
        let mut a = PositionSmoother::new();
        let mut b = PositionSmoother::new();
        for s in [&mut a, &mut b] {
            s.set_target(ID, 0.0, 0.0);
            s.set_target(ID, 100.0, 0.0);
        }
        a.update(0.008);
        b.update(0.016);
        let xa = a.position(ID).unwrap().current.x;
        let xb = b.position(ID).unwrap().current.x;
        assert!(xa < xb);
    }

    #[test]
    fn last_target_wins_between_ticks() {
        let mut s = PositionSmoother::new();
        s.set_target(ID, 0.0, 0.0);
        s.set_target(ID, 900.0, 0.0);
        s.set_target(ID, 20.0, 0.0);
        s.update(0.016);
        let p = s.position(ID).unwrap();
        assert_eq!(p.target, Vec2::new(20.0, 0.0));
        assert!(p.current.x > 0.0 && p.current.x < 20.0);
    }

    #[test]
    fn remove_and_retain_evict() {
        let mut s = PositionSmoother::new();
        for i in 0..4 {
            s.set_target(EntityId(i), i as f32, 0.0);
        }
        s.remove_entity(EntityId(0));
        assert!(s.position(EntityId(0)).is_none());

        s.retain(|id| id.0 % 2 == 0);
        assert_eq!(s.len(), 1);
        assert!(s.position(EntityId(2)).is_some());
    }
}
