use std::f32::consts::PI;

use crate::engine::GameEngine;
use crate::types::{Color, Direction, Ghost, Player, Rect, Vec2};

const MOUTH_HALF_ANGLE: f32 = 0.2 * PI;
const PLAYER_EYE_RADIUS: f32 = 3.0;
const LABEL_SIZE: f32 = 16.0;

/// Drawing target. Coordinates are simulation pixels.
pub trait Surface {
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Color);
    fn fill_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, color: Color);

    /// Text is optional; raster targets without a font skip it.
    fn fill_text(&mut self, _text: &str, _origin: Vec2, _size: f32, _color: Color) {}
}

pub fn draw_frame<S: Surface + ?Sized>(surface: &mut S, engine: &GameEngine) {
    let board = engine.board();
    surface.fill_rect(Rect::new(0.0, 0.0, board.width, board.height), Color::BLACK);

    for wall in engine.walls() {
        surface.fill_rect(*wall, Color::WALL_BLUE);
    }
    for dot in engine.dots() {
        surface.fill_circle(dot.pos, dot.radius, Color::WHITE);
    }
    for pellet in engine.power_pellets() {
        surface.fill_circle(pellet.pos, pellet.radius, Color::WHITE);
    }
    for ghost in engine.ghosts() {
        draw_ghost(surface, ghost);
    }
    draw_player(surface, engine.player());

    surface.fill_text(
        &format!("Level: {}", engine.level()),
        Vec2::new(20.0, 20.0),
        LABEL_SIZE,
        Color::WHITE,
    );
}

fn facing_angle(dir: Direction) -> f32 {
    match dir {
        Direction::Right => 0.0,
        Direction::Down => 0.5 * PI,
        Direction::Left => PI,
        Direction::Up => 1.5 * PI,
    }
}

fn draw_player<S: Surface + ?Sized>(surface: &mut S, player: &Player) {
    let center = player.pos;
    let radius = player.radius();
    surface.fill_circle(center, radius, Color::PACMAN_YELLOW);

    if player.mouth_open {
        // Wedge reaching past the rim so the whole sector is cut.
        let reach = radius / MOUTH_HALF_ANGLE.cos() + 1.0;
        let facing = facing_angle(player.dir);
        let edge = |angle: f32| {
            Vec2::new(
                center.x + reach * angle.cos(),
                center.y + reach * angle.sin(),
            )
        };
        surface.fill_triangle(
            center,
            edge(facing - MOUTH_HALF_ANGLE),
            edge(facing + MOUTH_HALF_ANGLE),
            Color::BLACK,
        );
    }

    let (eye_dx, eye_dy) = match player.dir {
        Direction::Right => (5.0, -10.0),
        Direction::Left => (-5.0, -10.0),
        Direction::Up => (10.0, -5.0),
        Direction::Down => (10.0, 5.0),
    };
    surface.fill_circle(
        Vec2::new(center.x + eye_dx, center.y + eye_dy),
        PLAYER_EYE_RADIUS,
        Color::BLACK,
    );
}

fn draw_ghost<S: Surface + ?Sized>(surface: &mut S, ghost: &Ghost) {
    let Vec2 { x, y } = ghost.pos;
    let size = ghost.size;
    let color = ghost.color();

    // Dome, body, then three scallops along the hem.
    surface.fill_circle(Vec2::new(x, y - size / 4.0), size / 2.0, color);
    surface.fill_rect(
        Rect::new(x - size / 2.0, y - size / 4.0, size, size / 2.0),
        color,
    );
    for i in 0..3 {
        let cx = x - size / 2.0 + size / 3.0 * i as f32 + size / 6.0;
        surface.fill_circle(Vec2::new(cx, y + size / 4.0), size / 6.0, color);
    }

    let eye_y = y - size / 5.0;
    let eyes = [x - size / 5.0, x + size / 5.0];
    for eye_x in eyes {
        surface.fill_circle(Vec2::new(eye_x, eye_y), size / 6.0, Color::WHITE);
    }

    let unit = ghost.dir.unit();
    let pupil_shift = size / 12.0;
    for eye_x in eyes {
        surface.fill_circle(
            Vec2::new(eye_x + unit.x * pupil_shift, eye_y + unit.y * pupil_shift),
            size / 12.0,
            Color::BLACK,
        );
    }
}

/// Software RGB framebuffer. Shapes are sampled at pixel centres.
#[derive(Clone, Debug)]
pub struct RasterSurface {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
}

impl RasterSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::BLACK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y * self.width + x])
    }

    /// Binary PPM (P6).
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len() * 3);
        out.extend_from_slice(header.as_bytes());
        for Color(r, g, b) in &self.pixels {
            out.extend_from_slice(&[*r, *g, *b]);
        }
        out
    }

    /// Pixel index range whose centres may fall inside `[min, max]`.
    fn span(min: f32, max: f32, limit: usize) -> std::ops::Range<usize> {
        if !(min.is_finite() && max.is_finite()) || max < 0.0 {
            return 0..0;
        }
        let start = (min - 0.5).ceil().max(0.0) as usize;
        let end = ((max - 0.5).floor() + 1.0).max(0.0) as usize;
        start.min(limit)..end.min(limit)
    }

    fn put(&mut self, x: usize, y: usize, color: Color) {
        self.pixels[y * self.width + x] = color;
    }
}

impl Surface for RasterSurface {
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let xs = Self::span(rect.x, rect.right(), self.width);
        let ys = Self::span(rect.y, rect.bottom(), self.height);
        for y in ys {
            for x in xs.clone() {
                self.put(x, y, color);
            }
        }
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Color) {
        let radius_sq = radius * radius;
        let xs = Self::span(center.x - radius, center.x + radius, self.width);
        let ys = Self::span(center.y - radius, center.y + radius, self.height);
        for y in ys {
            let dy = y as f32 + 0.5 - center.y;
            for x in xs.clone() {
                let dx = x as f32 + 0.5 - center.x;
                if dx * dx + dy * dy <= radius_sq {
                    self.put(x, y, color);
                }
            }
        }
    }

    fn fill_triangle(&mut self, a: Vec2, b: Vec2, c: Vec2, color: Color) {
        let edge =
            |p: Vec2, q: Vec2, x: f32, y: f32| (q.x - p.x) * (y - p.y) - (q.y - p.y) * (x - p.x);
        let area = edge(a, b, c.x, c.y);
        if area == 0.0 {
            return;
        }
        let xs = Self::span(a.x.min(b.x).min(c.x), a.x.max(b.x).max(c.x), self.width);
        let ys = Self::span(a.y.min(b.y).min(c.y), a.y.max(b.y).max(c.y), self.height);
        for y in ys {
            let py = y as f32 + 0.5;
            for x in xs.clone() {
                let px = x as f32 + 0.5;
                let w0 = edge(b, c, px, py) * area.signum();
                let w1 = edge(c, a, px, py) * area.signum();
                let w2 = edge(a, b, px, py) * area.signum();
                if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                    self.put(x, y, color);
                }
            }
        }
    }
}
