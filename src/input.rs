use crate::types::Direction;

/// Held-direction state written by keyboard, swipe or on-screen buttons and
/// read once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl InputState {
    pub fn holding(dir: Direction) -> Self {
        let mut input = Self::default();
        input.set(dir, true);
        input
    }

    pub fn set(&mut self, dir: Direction, pressed: bool) {
        match dir {
            Direction::Left => self.left = pressed,
            Direction::Right => self.right = pressed,
            Direction::Up => self.up = pressed,
            Direction::Down => self.down = pressed,
        }
    }

    pub fn release_all(&mut self) {
        *self = Self::default();
    }

    /// A swipe replaces whatever was held with its dominant direction. A
    /// zero-length swipe leaves the state alone.
    pub fn apply_swipe(&mut self, dx: f32, dy: f32) -> Option<Direction> {
        let dir = swipe_direction(dx, dy)?;
        *self = Self::holding(dir);
        Some(dir)
    }

    /// Left beats right beats up beats down when several are held.
    pub fn active_direction(&self) -> Option<Direction> {
        if self.left {
            Some(Direction::Left)
        } else if self.right {
            Some(Direction::Right)
        } else if self.up {
            Some(Direction::Up)
        } else if self.down {
            Some(Direction::Down)
        } else {
            None
        }
    }
}

pub fn swipe_direction(dx: f32, dy: f32) -> Option<Direction> {
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    if dx.abs() > dy.abs() {
        Some(if dx > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        })
    } else if dy > 0.0 {
        Some(Direction::Down)
    } else {
        Some(Direction::Up)
    }
}
