use crate::rng::Rng;
use crate::types::{Direction, Vec2};

pub(super) fn random_direction(rng: &mut Rng) -> Direction {
    Direction::ALL[rng.pick_index(Direction::ALL.len())]
}

/// One cardinal step toward `to` along whichever axis has the larger offset.
/// Ties go to the horizontal axis. Never diagonal.
pub(super) fn toward_direction(from: Vec2, to: Vec2) -> Option<Direction> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    if dx.abs() >= dy.abs() {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toward_prefers_larger_offset_axis() {
        let ghost = Vec2::new(100.0, 100.0);
        assert_eq!(
            toward_direction(ghost, Vec2::new(110.0, 300.0)),
            Some(Direction::Down)
        );
        assert_eq!(
            toward_direction(ghost, Vec2::new(110.0, 20.0)),
            Some(Direction::Up)
        );
        assert_eq!(
            toward_direction(ghost, Vec2::new(-50.0, 120.0)),
            Some(Direction::Left)
        );
        assert_eq!(
            toward_direction(ghost, Vec2::new(150.0, 150.0)),
            Some(Direction::Right)
        );
        assert_eq!(toward_direction(ghost, ghost), None);
    }

    #[test]
    fn random_direction_reaches_all_four() {
        let mut rng = Rng::new(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(random_direction(&mut rng));
        }
        assert_eq!(seen.len(), 4);
    }
}
