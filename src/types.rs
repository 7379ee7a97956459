use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn unit(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dir: Direction, distance: f32) -> Self {
        let unit = dir.unit();
        Self::new(self.x + unit.x * distance, self.y + unit.y * distance)
    }

    pub fn distance(self, other: Vec2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle; walls are made of these.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains_expanded(&self, point: Vec2, margin: f32) -> bool {
        point.x > self.x - margin
            && point.x < self.right() + margin
            && point.y > self.y - margin
            && point.y < self.bottom() + margin
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    pub const BLACK: Color = Color(0x00, 0x00, 0x00);
    pub const WHITE: Color = Color(0xFF, 0xFF, 0xFF);
    pub const WALL_BLUE: Color = Color(0x00, 0x00, 0xFF);
    pub const FRIGHTENED_BLUE: Color = Color(0x00, 0x00, 0xFF);
    pub const PACMAN_YELLOW: Color = Color(0xFF, 0xFF, 0x00);

    pub fn hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

pub const GHOST_SLOT_COLORS: [Color; 4] = [
    Color(0xFF, 0x00, 0x00),
    Color(0x00, 0xFF, 0xFF),
    Color(0xFF, 0xB8, 0xFF),
    Color(0xFF, 0xB8, 0x52),
];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Dot {
    pub pos: Vec2,
    pub radius: f32,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PowerPellet {
    pub pos: Vec2,
    pub radius: f32,
    pub value: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Player {
    pub pos: Vec2,
    pub size: f32,
    pub speed: f32,
    pub dir: Direction,
    #[serde(rename = "mouthOpen")]
    pub mouth_open: bool,
}

impl Player {
    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ghost {
    pub id: u32,
    pub slot: usize,
    pub pos: Vec2,
    pub spawn: Vec2,
    pub size: f32,
    pub speed: f32,
    pub dir: Direction,
    pub vulnerable: bool,
    pub vulnerable_epoch: u64,
}

impl Ghost {
    pub fn radius(&self) -> f32 {
        self.size / 2.0
    }

    pub fn color(&self) -> Color {
        if self.vulnerable {
            Color::FRIGHTENED_BLUE
        } else {
            GHOST_SLOT_COLORS[self.slot % GHOST_SLOT_COLORS.len()]
        }
    }

    pub fn make_vulnerable(&mut self, epoch: u64) {
        self.vulnerable = true;
        self.vulnerable_epoch = epoch;
    }

    pub fn recover(&mut self) {
        self.vulnerable = false;
    }

    pub fn view(&self) -> GhostView {
        GhostView {
            id: self.id,
            slot: self.slot,
            x: self.pos.x,
            y: self.pos.y,
            size: self.size,
            dir: self.dir,
            vulnerable: self.vulnerable,
            color: self.color().hex(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingPayment,
    Ready,
    Playing,
    LevelTransition,
    GameOver,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GameSession {
    pub score: u32,
    pub level: u32,
    pub started: bool,
    pub over: bool,
    pub paid: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GhostView {
    pub id: u32,
    pub slot: usize,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub dir: Direction,
    pub vulnerable: bool,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    DotEaten {
        x: f32,
        y: f32,
        value: u32,
    },
    PelletTaken {
        x: f32,
        y: f32,
        value: u32,
    },
    GhostsVulnerable {
        #[serde(rename = "untilMs")]
        until_ms: u64,
    },
    GhostRecovered {
        #[serde(rename = "ghostId")]
        ghost_id: u32,
    },
    GhostEaten {
        #[serde(rename = "ghostId")]
        ghost_id: u32,
        bonus: u32,
    },
    PlayerCaught {
        #[serde(rename = "ghostId")]
        ghost_id: u32,
    },
    LevelCleared {
        level: u32,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct LevelInit {
    pub level: u32,
    pub width: f32,
    pub height: f32,
    pub walls: Vec<Rect>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    #[serde(rename = "nowMs")]
    pub now_ms: u64,
    pub level: u32,
    pub score: u32,
    pub player: Player,
    pub ghosts: Vec<GhostView>,
    pub dots: Vec<Dot>,
    #[serde(rename = "powerPellets")]
    pub power_pellets: Vec<PowerPellet>,
    pub events: Vec<GameEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub session: GameSession,
    pub message: Option<String>,
    pub frame: Option<FrameSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub score: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<LeaderboardEntry>,
}
