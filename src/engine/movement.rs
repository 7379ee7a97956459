use super::*;

impl GameEngine {
    /// Moves the player one step in the held direction unless a wall is in the
    /// way. Facing follows the input even when the move is refused.
    pub(super) fn update_player(&mut self, input: &InputState) {
        if let Some(dir) = input.active_direction() {
            self.player.dir = dir;
            let candidate = self.player.pos.offset(dir, self.player.speed);
            if !circle_hits_any_wall(candidate, self.player.radius(), &self.walls) {
                self.player.pos = candidate;
            }
        }
        self.player.mouth_open = !self.player.mouth_open;
    }

    pub(super) fn update_ghosts(&mut self) {
        let targeting_chance = ghost_targeting_chance(self.level);
        let player_pos = self.player.pos;
        let walls = &self.walls;
        let rng = &mut self.rng;

        for ghost in &mut self.ghosts {
            let candidate = ghost.pos.offset(ghost.dir, ghost.speed);
            if circle_hits_any_wall(candidate, ghost.radius(), walls) {
                // Stays put this tick; the new heading is tried next tick.
                ghost.dir = random_direction(rng);
            } else {
                ghost.pos = candidate;
            }

            if rng.chance(targeting_chance) {
                if let Some(dir) = toward_direction(ghost.pos, player_pos) {
                    ghost.dir = dir;
                }
            }
        }
    }
}
