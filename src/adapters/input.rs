//! Input collaborators: key state, cursor movement and screen projection.

use rand::Rng;
use tracing::trace;

use super::world::EntitySnapshot;
use crate::domain::Vector3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

pub trait KeyboardState {
    fn is_key_down(&self, key: &str) -> bool;
}

pub trait CursorInput: Send + Sync {
    fn move_cursor_to(&self, pos: Vector2);
}

/// World-to-screen projection owned by the rendering adapter
pub trait ScreenProjector: Send + Sync {
    fn world_to_screen(&self, pos: Vector3) -> Option<Vector2>;
}

/// Fires once per physical press: true only on the up-to-down edge
#[derive(Debug, Default)]
pub struct HotkeyLatch {
    was_down: bool,
}

impl HotkeyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pressed_once(&mut self, is_down: bool) -> bool {
        let edge = is_down && !self.was_down;
        self.was_down = is_down;
        edge
    }
}

/// Offset `pos` by a random amount in `[0, max_offset)` on both axes
pub fn jittered<R: Rng + ?Sized>(pos: Vector2, max_offset: u32, rng: &mut R) -> Vector2 {
    if max_offset == 0 {
        return pos;
    }
    let dx = rng.gen_range(0..max_offset) as f32;
    let dy = rng.gen_range(0..max_offset) as f32;
    Vector2::new(pos.x + dx, pos.y + dy)
}

/// Move the cursor over `entity`; returns false when it is off screen
pub fn hover_to(
    entity: &EntitySnapshot,
    projector: &dyn ScreenProjector,
    cursor: &dyn CursorInput,
    max_offset: u32,
) -> bool {
    let Some(screen) = projector.world_to_screen(entity.pos) else {
        trace!("{} is not on screen", entity.name);
        return false;
    };
    let target = jittered(screen, max_offset, &mut rand::thread_rng());
    cursor.move_cursor_to(target);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    #[test]
    fn test_latch_fires_on_down_edge_only() {
        let mut latch = HotkeyLatch::new();
        let presses: Vec<bool> = [false, true, true, true, false, true]
            .into_iter()
            .map(|down| latch.pressed_once(down))
            .collect();
        assert_eq!(presses, vec![false, true, false, false, false, true]);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = jittered(Vector2::new(100.0, 50.0), 10, &mut rng);
            assert!((100.0..110.0).contains(&p.x));
            assert!((50.0..60.0).contains(&p.y));
        }
        assert_eq!(
            jittered(Vector2::new(1.0, 2.0), 0, &mut rng),
            Vector2::new(1.0, 2.0)
        );
    }

    struct FixedProjector(Option<Vector2>);

    impl ScreenProjector for FixedProjector {
        fn world_to_screen(&self, _pos: Vector3) -> Option<Vector2> {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingCursor(Mutex<Vec<Vector2>>);

    impl CursorInput for RecordingCursor {
        fn move_cursor_to(&self, pos: Vector2) {
            self.0.lock().unwrap().push(pos);
        }
    }

    #[test]
    fn test_hover_to_moves_cursor_when_visible() {
        let leader = EntitySnapshot {
            name: "Bob".to_string(),
            pos: Vector3::ZERO,
        };
        let cursor = RecordingCursor::default();

        assert!(!hover_to(&leader, &FixedProjector(None), &cursor, 5));
        assert!(cursor.0.lock().unwrap().is_empty());

        assert!(hover_to(
            &leader,
            &FixedProjector(Some(Vector2::new(10.0, 10.0))),
            &cursor,
            1
        ));
        assert_eq!(*cursor.0.lock().unwrap(), vec![Vector2::new(10.0, 10.0)]);
    }
}
