use crate::types::{Rect, Vec2};

/// True when the circle at `(cx, cy)` with radius `r` overlaps `rect`.
/// Rectangles with negative extents are not supported.
pub fn circle_intersects_rect(cx: f32, cy: f32, r: f32, rect: &Rect) -> bool {
    let closest_x = cx.clamp(rect.x, rect.right());
    let closest_y = cy.clamp(rect.y, rect.bottom());
    let dx = cx - closest_x;
    let dy = cy - closest_y;
    (dx * dx + dy * dy).sqrt() < r
}

pub fn circle_intersects_circle(p1: Vec2, r1: f32, p2: Vec2, r2: f32) -> bool {
    p1.distance(p2) < r1 + r2
}

pub fn circle_hits_any_wall(center: Vec2, r: f32, walls: &[Rect]) -> bool {
    walls
        .iter()
        .any(|wall| circle_intersects_rect(center.x, center.y, r, wall))
}

/// Stricter than [`circle_hits_any_wall`]: the whole square of side `2 * margin`
/// around `center` must clear every wall, corners included.
pub fn within_any_expanded_wall(center: Vec2, margin: f32, walls: &[Rect]) -> bool {
    walls.iter().any(|wall| wall.contains_expanded(center, margin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_touching_edge_is_not_a_hit() {
        let wall = Rect::new(100.0, 100.0, 20.0, 20.0);
        assert!(!circle_intersects_rect(90.0, 110.0, 10.0, &wall));
        assert!(circle_intersects_rect(90.5, 110.0, 10.0, &wall));
    }

    #[test]
    fn circle_inside_rect_hits() {
        let wall = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(circle_intersects_rect(50.0, 50.0, 1.0, &wall));
    }

    #[test]
    fn corner_uses_euclidean_distance() {
        let wall = Rect::new(100.0, 100.0, 20.0, 20.0);
        // 7,7 away from the corner: inside the bounding square, outside the radius.
        assert!(!circle_intersects_rect(93.0, 93.0, 9.0, &wall));
        assert!(circle_intersects_rect(93.0, 93.0, 10.0, &wall));
    }

    #[test]
    fn circles_overlap_below_sum_of_radii() {
        let a = Vec2::new(100.0, 100.0);
        assert!(circle_intersects_circle(a, 15.0, Vec2::new(102.0, 100.0), 5.0));
        assert!(!circle_intersects_circle(a, 15.0, Vec2::new(120.0, 100.0), 5.0));
        assert!(circle_intersects_circle(a, 15.0, Vec2::new(119.9, 100.0), 5.0));
    }

    #[test]
    fn any_wall_checks_every_rect() {
        let walls = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(200.0, 200.0, 10.0, 10.0),
        ];
        assert!(circle_hits_any_wall(Vec2::new(195.0, 205.0), 6.0, &walls));
        assert!(!circle_hits_any_wall(Vec2::new(100.0, 100.0), 6.0, &walls));
    }

    #[test]
    fn expanded_bound_catches_corner_the_circle_misses() {
        let walls = [Rect::new(100.0, 100.0, 20.0, 20.0)];
        let near_corner = Vec2::new(96.0, 96.0);
        assert!(!circle_hits_any_wall(near_corner, 5.0, &walls));
        assert!(within_any_expanded_wall(near_corner, 5.0, &walls));
        assert!(!within_any_expanded_wall(Vec2::new(95.0, 110.0), 5.0, &walls));
    }
}
