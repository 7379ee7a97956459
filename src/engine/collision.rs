use super::*;

impl GameEngine {
    /// Dots first, then power pellets. Both lists are walked back to front so
    /// removal keeps the remaining indices valid.
    pub(super) fn resolve_item_pickups(&mut self) {
        let player_pos = self.player.pos;
        let player_radius = self.player.radius();

        for idx in (0..self.dots.len()).rev() {
            let dot = self.dots[idx];
            if circle_intersects_circle(player_pos, player_radius, dot.pos, dot.radius) {
                self.score = self.score.saturating_add(dot.value);
                self.dots.remove(idx);
                self.events.push(GameEvent::DotEaten {
                    x: dot.pos.x,
                    y: dot.pos.y,
                    value: dot.value,
                });
            }
        }

        for idx in (0..self.power_pellets.len()).rev() {
            let pellet = self.power_pellets[idx];
            if circle_intersects_circle(player_pos, player_radius, pellet.pos, pellet.radius) {
                self.score = self.score.saturating_add(pellet.value);
                self.power_pellets.remove(idx);
                self.events.push(GameEvent::PelletTaken {
                    x: pellet.pos.x,
                    y: pellet.pos.y,
                    value: pellet.value,
                });
                self.frighten_ghosts();
            }
        }
    }

    fn frighten_ghosts(&mut self) {
        self.pellet_epoch += 1;
        let epoch = self.pellet_epoch;
        let until_ms = self.elapsed_ms + VULNERABLE_DURATION_MS;
        let superseded = self
            .vulnerability_timers
            .cancel_where(|timer| timer.epoch < epoch);
        if superseded > 0 {
            debug!(superseded, epoch, "earlier vulnerability timers replaced");
        }
        for ghost in &mut self.ghosts {
            ghost.make_vulnerable(epoch);
            self.vulnerability_timers.schedule(
                until_ms,
                VulnerabilityTimer {
                    ghost_id: ghost.id,
                    epoch,
                },
            );
        }
        self.events.push(GameEvent::GhostsVulnerable { until_ms });
    }

    /// Reverts vulnerability whose timer is due, but only for ghosts still
    /// frightened by the same pickup that scheduled it.
    pub(super) fn expire_vulnerability(&mut self) {
        while let Some(timer) = self.vulnerability_timers.pop_due(self.elapsed_ms) {
            let Some(ghost) = self.ghosts.iter_mut().find(|g| g.id == timer.ghost_id) else {
                debug!(ghost_id = timer.ghost_id, "vulnerability timer for a retired ghost");
                continue;
            };
            if ghost.vulnerable && ghost.vulnerable_epoch == timer.epoch {
                ghost.recover();
                self.events.push(GameEvent::GhostRecovered { ghost_id: ghost.id });
            }
        }
    }

    /// Returns the id of the ghost that caught the player, if any. Checking
    /// stops at the first catch.
    pub(super) fn resolve_ghost_contacts(&mut self) -> Option<u32> {
        let player_pos = self.player.pos;
        let player_radius = self.player.radius();

        for ghost in &mut self.ghosts {
            if !circle_intersects_circle(player_pos, player_radius, ghost.pos, ghost.radius()) {
                continue;
            }
            if ghost.vulnerable {
                self.score = self.score.saturating_add(GHOST_EATEN_BONUS);
                ghost.pos = ghost.spawn;
                ghost.recover();
                let ghost_id = ghost.id;
                self.vulnerability_timers
                    .cancel_where(|timer| timer.ghost_id == ghost_id);
                self.events.push(GameEvent::GhostEaten {
                    ghost_id: ghost.id,
                    bonus: GHOST_EATEN_BONUS,
                });
            } else {
                self.events.push(GameEvent::PlayerCaught { ghost_id: ghost.id });
                return Some(ghost.id);
            }
        }
        None
    }
}
