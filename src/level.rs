use std::fmt;

use crate::constants::{
    ghost_base_speed, BOARD_HEIGHT, BOARD_WIDTH, DOT_RADIUS, DOT_SPACING, DOT_VALUE, GHOST_COUNT,
    GHOST_SIZE, GHOST_SPAWN_SPACING, GHOST_SPAWN_X, GHOST_SPAWN_Y, GHOST_SPEED_JITTER,
    PLAYER_SIZE, PLAYER_SPAWN_X, PLAYER_SPAWN_Y, POWER_PELLET_COUNT, POWER_PELLET_MARGIN,
    POWER_PELLET_RADIUS, POWER_PELLET_VALUE, WALL_CELL,
};
use crate::geometry::{circle_hits_any_wall, within_any_expanded_wall};
use crate::rng::Rng;
use crate::types::{Direction, Dot, Ghost, PowerPellet, Rect, Vec2};

const INTERIOR_WALLS: [Rect; 5] = [
    Rect::new(100.0, 100.0, 100.0, 20.0),
    Rect::new(300.0, 100.0, 100.0, 20.0),
    Rect::new(100.0, 200.0, 20.0, 100.0),
    Rect::new(400.0, 200.0, 20.0, 100.0),
    Rect::new(200.0, 300.0, 100.0, 20.0),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Board {
    pub width: f32,
    pub height: f32,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            width: BOARD_WIDTH,
            height: BOARD_HEIGHT,
        }
    }
}

impl Board {
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }
}

#[derive(Clone, Debug)]
pub struct GeneratedLevel {
    pub level: u32,
    pub board: Board,
    pub walls: Vec<Rect>,
    pub dots: Vec<Dot>,
    pub power_pellets: Vec<PowerPellet>,
    pub ghosts: Vec<Ghost>,
    pub player_spawn: Vec2,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LevelError {
    DotInsideWall { x: f32, y: f32 },
    PelletInsideWall { x: f32, y: f32 },
    GhostSpawnInsideWall { slot: usize },
    PlayerSpawnInsideWall,
    WrongPelletCount(usize),
    WrongGhostCount(usize),
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::DotInsideWall { x, y } => write!(f, "dot at ({x}, {y}) overlaps a wall"),
            LevelError::PelletInsideWall { x, y } => {
                write!(f, "power pellet at ({x}, {y}) overlaps a wall")
            }
            LevelError::GhostSpawnInsideWall { slot } => {
                write!(f, "ghost spawn slot {slot} overlaps a wall")
            }
            LevelError::PlayerSpawnInsideWall => write!(f, "player spawn overlaps a wall"),
            LevelError::WrongPelletCount(count) => {
                write!(f, "expected {POWER_PELLET_COUNT} power pellets, generated {count}")
            }
            LevelError::WrongGhostCount(count) => {
                write!(f, "expected {GHOST_COUNT} ghosts, generated {count}")
            }
        }
    }
}

impl std::error::Error for LevelError {}

/// Builds walls, dots, pellets and the ghost roster for `level`.
///
/// The layout is the same on every level; only ghost speed changes. Ghost ids
/// are `first_ghost_id..first_ghost_id + GHOST_COUNT` so timers from an older
/// level never match a fresh ghost.
pub fn generate_level(
    level: u32,
    board: Board,
    rng: &mut Rng,
    first_ghost_id: u32,
) -> GeneratedLevel {
    let level = level.max(1);
    let walls = build_walls(board);
    let dots = place_dots(board, &walls);
    let power_pellets = place_power_pellets(board);
    let ghosts = (0..GHOST_COUNT)
        .map(|slot| {
            let spawn = ghost_spawn_slot(slot);
            Ghost {
                id: first_ghost_id + slot as u32,
                slot,
                pos: spawn,
                spawn,
                size: GHOST_SIZE,
                speed: ghost_base_speed(level) + rng.jitter(GHOST_SPEED_JITTER),
                dir: Direction::ALL[rng.pick_index(Direction::ALL.len())],
                vulnerable: false,
                vulnerable_epoch: 0,
            }
        })
        .collect();

    GeneratedLevel {
        level,
        board,
        walls,
        dots,
        power_pellets,
        ghosts,
        player_spawn: Vec2::new(PLAYER_SPAWN_X, PLAYER_SPAWN_Y),
    }
}

/// Re-rolls every ghost's speed for `level` with fresh jitter.
pub fn adjust_difficulty(ghosts: &mut [Ghost], level: u32, rng: &mut Rng) {
    let base = ghost_base_speed(level);
    for ghost in ghosts {
        ghost.speed = base + rng.jitter(GHOST_SPEED_JITTER);
    }
}

pub fn ghost_spawn_slot(slot: usize) -> Vec2 {
    Vec2::new(GHOST_SPAWN_X + slot as f32 * GHOST_SPAWN_SPACING, GHOST_SPAWN_Y)
}

pub fn build_walls(board: Board) -> Vec<Rect> {
    let mut walls = Vec::new();
    let mut x = 0.0;
    while x < board.width {
        walls.push(Rect::new(x, 0.0, WALL_CELL, WALL_CELL));
        walls.push(Rect::new(x, board.height - WALL_CELL, WALL_CELL, WALL_CELL));
        x += WALL_CELL;
    }
    let mut y = 0.0;
    while y < board.height {
        walls.push(Rect::new(0.0, y, WALL_CELL, WALL_CELL));
        walls.push(Rect::new(board.width - WALL_CELL, y, WALL_CELL, WALL_CELL));
        y += WALL_CELL;
    }
    walls.extend_from_slice(&INTERIOR_WALLS);
    walls
}

fn place_dots(board: Board, walls: &[Rect]) -> Vec<Dot> {
    let mut dots = Vec::new();
    let mut x = DOT_SPACING;
    while x < board.width {
        let mut y = DOT_SPACING;
        while y < board.height {
            let pos = Vec2::new(x, y);
            if !within_any_expanded_wall(pos, DOT_RADIUS, walls) {
                dots.push(Dot {
                    pos,
                    radius: DOT_RADIUS,
                    value: DOT_VALUE,
                });
            }
            y += DOT_SPACING;
        }
        x += DOT_SPACING;
    }
    dots
}

fn place_power_pellets(board: Board) -> Vec<PowerPellet> {
    let near = POWER_PELLET_MARGIN;
    let far_x = board.width - POWER_PELLET_MARGIN;
    let far_y = board.height - POWER_PELLET_MARGIN;
    [(near, near), (far_x, near), (near, far_y), (far_x, far_y)]
        .into_iter()
        .map(|(x, y)| PowerPellet {
            pos: Vec2::new(x, y),
            radius: POWER_PELLET_RADIUS,
            value: POWER_PELLET_VALUE,
        })
        .collect()
}

pub fn validate_level(level: &GeneratedLevel) -> Result<(), LevelError> {
    for dot in &level.dots {
        if within_any_expanded_wall(dot.pos, dot.radius, &level.walls) {
            return Err(LevelError::DotInsideWall {
                x: dot.pos.x,
                y: dot.pos.y,
            });
        }
    }
    if level.power_pellets.len() != POWER_PELLET_COUNT {
        return Err(LevelError::WrongPelletCount(level.power_pellets.len()));
    }
    for pellet in &level.power_pellets {
        if within_any_expanded_wall(pellet.pos, pellet.radius, &level.walls) {
            return Err(LevelError::PelletInsideWall {
                x: pellet.pos.x,
                y: pellet.pos.y,
            });
        }
    }
    if level.ghosts.len() != GHOST_COUNT {
        return Err(LevelError::WrongGhostCount(level.ghosts.len()));
    }
    for ghost in &level.ghosts {
        if circle_hits_any_wall(ghost.spawn, ghost.radius(), &level.walls) {
            return Err(LevelError::GhostSpawnInsideWall { slot: ghost.slot });
        }
    }
    if circle_hits_any_wall(level.player_spawn, PLAYER_SIZE / 2.0, &level.walls) {
        return Err(LevelError::PlayerSpawnInsideWall);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(level: u32, seed: u32) -> GeneratedLevel {
        let mut rng = Rng::new(seed);
        generate_level(level, Board::default(), &mut rng, 1)
    }

    #[test]
    fn default_level_passes_validation() {
        for level in 1..=8 {
            let generated = generate(level, level * 31);
            assert_eq!(validate_level(&generated), Ok(()));
        }
    }

    #[test]
    fn no_item_center_lies_within_expanded_wall() {
        for level in 1..=25 {
            for seed in [9, level * 131, u32::MAX - level] {
                let generated = generate(level, seed);
                for wall in &generated.walls {
                    for dot in &generated.dots {
                        assert!(
                            !wall.contains_expanded(dot.pos, dot.radius),
                            "level {level}: {dot:?} in {wall:?}"
                        );
                    }
                    for pellet in &generated.power_pellets {
                        assert!(
                            !wall.contains_expanded(pellet.pos, pellet.radius),
                            "level {level}: {pellet:?} in {wall:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn validation_uses_expanded_wall_bound() {
        let mut generated = generate(1, 1);
        // Diagonal to a pillar corner: clear of the circle test, inside the bound.
        generated.dots.push(Dot {
            pos: Vec2::new(96.0, 96.0),
            radius: DOT_RADIUS,
            value: DOT_VALUE,
        });
        assert_eq!(
            validate_level(&generated),
            Err(LevelError::DotInsideWall { x: 96.0, y: 96.0 })
        );
    }

    #[test]
    fn outer_ring_and_interior_walls_are_built() {
        let walls = build_walls(Board::default());
        // 30 cells across top and bottom, 25 down each side, plus the maze pieces.
        assert_eq!(walls.len(), 30 * 2 + 25 * 2 + INTERIOR_WALLS.len());
        assert!(walls.contains(&Rect::new(400.0, 200.0, 20.0, 100.0)));
        assert!(walls.contains(&Rect::new(580.0, 480.0, 20.0, 20.0)));
    }

    #[test]
    fn dots_sit_on_the_grid_and_skip_walls() {
        let generated = generate(1, 1);
        assert!(!generated.dots.is_empty());
        for dot in &generated.dots {
            assert_eq!(dot.pos.x % DOT_SPACING, 0.0);
            assert_eq!(dot.pos.y % DOT_SPACING, 0.0);
            assert_eq!(dot.value, DOT_VALUE);
        }
        // (400, 200) is on the grid but inside the right-hand pillar.
        assert!(!generated
            .dots
            .iter()
            .any(|dot| dot.pos == Vec2::new(400.0, 200.0)));
        assert!(generated
            .dots
            .iter()
            .any(|dot| dot.pos == Vec2::new(40.0, 40.0)));
    }

    #[test]
    fn pellets_are_inset_in_each_corner() {
        let generated = generate(1, 1);
        let positions: Vec<(f32, f32)> = generated
            .power_pellets
            .iter()
            .map(|p| (p.pos.x, p.pos.y))
            .collect();
        assert_eq!(
            positions,
            vec![(60.0, 60.0), (540.0, 60.0), (60.0, 440.0), (540.0, 440.0)]
        );
    }

    #[test]
    fn ghost_roster_uses_fixed_slots_and_level_speed() {
        for level in [1, 2, 5] {
            let generated = generate(level, 77);
            assert_eq!(generated.ghosts.len(), GHOST_COUNT);
            for (slot, ghost) in generated.ghosts.iter().enumerate() {
                assert_eq!(ghost.slot, slot);
                assert_eq!(ghost.id, 1 + slot as u32);
                assert_eq!(ghost.pos, ghost_spawn_slot(slot));
                assert!(!ghost.vulnerable);
                let base = ghost_base_speed(level);
                assert!(ghost.speed >= base && ghost.speed < base + GHOST_SPEED_JITTER);
            }
        }
    }

    #[test]
    fn adjust_difficulty_rerolls_within_band() {
        let mut generated = generate(1, 5);
        adjust_difficulty(&mut generated.ghosts, 4, &mut Rng::new(8));
        for ghost in &generated.ghosts {
            assert!(ghost.speed >= 3.5 && ghost.speed < 4.0);
        }
    }

    #[test]
    fn validation_reports_dot_in_wall() {
        let mut generated = generate(1, 1);
        generated.dots.push(Dot {
            pos: Vec2::new(110.0, 110.0),
            radius: DOT_RADIUS,
            value: DOT_VALUE,
        });
        assert_eq!(
            validate_level(&generated),
            Err(LevelError::DotInsideWall { x: 110.0, y: 110.0 })
        );
    }

    #[test]
    fn validation_reports_ghost_spawn_in_wall() {
        let mut generated = generate(1, 1);
        generated.ghosts[3].spawn = Vec2::new(420.0, 200.0);
        assert_eq!(
            validate_level(&generated),
            Err(LevelError::GhostSpawnInsideWall { slot: 3 })
        );
    }
}
