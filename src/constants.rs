pub const TICK_RATE: u32 = 60;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const BOARD_WIDTH: f32 = 600.0;
pub const BOARD_HEIGHT: f32 = 500.0;
pub const WALL_CELL: f32 = 20.0;

pub const DOT_SPACING: f32 = 40.0;
pub const DOT_RADIUS: f32 = 5.0;
pub const DOT_VALUE: u32 = 10;

pub const POWER_PELLET_COUNT: usize = 4;
pub const POWER_PELLET_MARGIN: f32 = 60.0;
pub const POWER_PELLET_RADIUS: f32 = 15.0;
pub const POWER_PELLET_VALUE: u32 = 50;

pub const PLAYER_SIZE: f32 = 30.0;
pub const PLAYER_SPEED: f32 = 5.0;
pub const PLAYER_SPAWN_X: f32 = 50.0;
pub const PLAYER_SPAWN_Y: f32 = 50.0;

pub const GHOST_COUNT: usize = 4;
pub const GHOST_SIZE: f32 = 25.0;
pub const GHOST_SPAWN_X: f32 = 260.0;
pub const GHOST_SPAWN_Y: f32 = 200.0;
pub const GHOST_SPAWN_SPACING: f32 = 40.0;
pub const GHOST_BASE_SPEED: f32 = 2.0;
pub const GHOST_SPEED_PER_LEVEL: f32 = 0.5;
pub const GHOST_SPEED_JITTER: f32 = 0.5;
pub const GHOST_EATEN_BONUS: u32 = 200;
pub const GHOST_TARGETING_PER_LEVEL: f32 = 0.05;
pub const GHOST_TARGETING_MIN_LEVEL: u32 = 3;

pub const VULNERABLE_DURATION_MS: u64 = 5_000;
pub const LEVEL_TRANSITION_MS: u64 = 2_000;
pub const GAME_OVER_DISPLAY_MS: u64 = 3_000;

pub const LEVEL_GENERATION_ATTEMPTS: usize = 3;
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const MAX_LEADERBOARD_SIZE: usize = 100;
pub const ENTRY_FEE_LABEL: &str = "0.1 MON";

pub fn ghost_base_speed(level: u32) -> f32 {
    GHOST_BASE_SPEED + level.saturating_sub(1) as f32 * GHOST_SPEED_PER_LEVEL
}

pub fn ghost_targeting_chance(level: u32) -> f32 {
    if level < GHOST_TARGETING_MIN_LEVEL {
        return 0.0;
    }
    (GHOST_TARGETING_PER_LEVEL * (level - 1) as f32).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ghost_speed_scales_by_half_unit_per_level() {
        assert_relative_eq!(ghost_base_speed(1), 2.0);
        assert_relative_eq!(ghost_base_speed(2), 2.5);
        assert_relative_eq!(ghost_base_speed(5), 4.0);
    }

    #[test]
    fn targeting_starts_after_level_two() {
        assert_eq!(ghost_targeting_chance(1), 0.0);
        assert_eq!(ghost_targeting_chance(2), 0.0);
        assert_relative_eq!(ghost_targeting_chance(3), 0.1);
        assert_relative_eq!(ghost_targeting_chance(11), 0.5);
        assert_eq!(ghost_targeting_chance(100), 1.0);
    }
}
