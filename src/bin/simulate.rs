use anyhow::Context;
use clap::Parser;
use pacman_arcade_server::auth::{Identity, StaticAuth};
use pacman_arcade_server::constants::TICK_MS;
use pacman_arcade_server::geometry::within_any_expanded_wall;
use pacman_arcade_server::input::InputState;
use pacman_arcade_server::ledger::{InMemoryLedger, Ledger};
use pacman_arcade_server::level::Board;
use pacman_arcade_server::render::RasterSurface;
use pacman_arcade_server::rng::Rng;
use pacman_arcade_server::session::{AppContext, ArcadeSession};
use pacman_arcade_server::types::{
    Color, Direction, FrameSnapshot, GameEvent, Phase, Rect, Vec2, GHOST_SLOT_COLORS,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

const GHOST_DANGER_RADIUS: f32 = 70.0;
const STUCK_TICKS: u32 = 6;
const GAME_OVER_WAIT_TICKS: u32 = 1_000;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 3)]
    games: u32,
    #[arg(long, default_value_t = 60 * 60 * 10)]
    max_ticks: u64,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    /// Writes the last game's final frame as a binary PPM.
    #[arg(long)]
    frame_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    #[serde(rename = "userId")]
    user_id: u64,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    outcome: String,
    #[serde(rename = "finalScore")]
    final_score: u32,
    #[serde(rename = "levelReached")]
    level_reached: u32,
    ticks: u64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "dotsEaten")]
    dots_eaten: u32,
    #[serde(rename = "pelletsTaken")]
    pellets_taken: u32,
    #[serde(rename = "ghostsEaten")]
    ghosts_eaten: u32,
    #[serde(rename = "levelsCleared")]
    levels_cleared: u32,
    submitted: bool,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct ScenarioRunResult {
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
    frame: Option<RasterSurface>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageScore")]
    average_score: u32,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    leaderboard: Value,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));
    let ledger = InMemoryLedger::instant();
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_anomalies = 0usize;
    let mut last_frame = None;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({ "userId": scenario.user_id, "maxTicks": cli.max_ticks }),
        );
        let scenario_run = run_scenario(&scenario, &ledger, cli.max_ticks).await;

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({ "message": anomaly.message }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        *outcome_counts
            .entry(scenario_run.result.outcome.clone())
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.result.ticks),
            json!({
                "outcome": scenario_run.result.outcome,
                "finalScore": scenario_run.result.final_score,
                "levelReached": scenario_run.result.level_reached,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&scenario_run.result).expect("scenario result should serialize")
        );
        if scenario_run.frame.is_some() {
            last_frame = scenario_run.frame;
        }
        scenario_results.push(scenario_run.result);
    }

    let leaderboard = match ledger.get_top_players(10).await {
        Ok(entries) => json!(entries),
        Err(error) => json!({ "error": error.to_string() }),
    };
    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        outcome_counts,
        total_anomalies,
        leaderboard,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    let mut frame_out_written: Option<String> = None;
    if let (Some(path), Some(frame)) = (cli.frame_out.as_ref(), last_frame.as_ref()) {
        if let Err(error) = write_frame(path, frame) {
            emit_log(
                "error",
                "frame_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({ "error": format!("{error:#}") }),
            );
            std::process::exit(2);
        }
        frame_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageScore": summary.average_score,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
            "frameOut": frame_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

async fn run_scenario(
    scenario: &Scenario,
    ledger: &InMemoryLedger,
    max_ticks: u64,
) -> ScenarioRunResult {
    let ctx = AppContext {
        auth: Arc::new(StaticAuth::signed_in(Identity {
            user_id: scenario.user_id,
            display_name: scenario.name.clone(),
        })),
        ledger: Arc::new(ledger.clone()),
        debug_pay_override: false,
    };
    let mut session = ArcadeSession::new(ctx, scenario.seed);
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    let mut result = ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        outcome: "aborted".to_string(),
        final_score: 0,
        level_reached: 0,
        ticks: 0,
        duration_ms: 0,
        dots_eaten: 0,
        pellets_taken: 0,
        ghosts_eaten: 0,
        levels_cleared: 0,
        submitted: false,
        anomalies: Vec::new(),
    };

    let started = match session.pay().await {
        Ok(()) => session.start(),
        Err(error) => Err(error),
    };
    if let Err(error) = started {
        push_anomaly(
            &mut anomalies,
            &mut anomaly_records,
            &mut anomaly_seen,
            0,
            format!("could not start game: {error}"),
        );
        result.anomalies = anomalies;
        return ScenarioRunResult {
            result,
            anomaly_records,
            frame: None,
        };
    }

    let mut pilot = Autopilot::new(scenario.seed ^ 0x5eed);
    let mut last_score = 0u32;
    let mut tick = 0u64;
    loop {
        if tick >= max_ticks {
            result.outcome = "tick_limit".to_string();
            break;
        }
        tick += 1;

        let input = match session.snapshot(false).frame {
            Some(frame) if session.phase() == Phase::Playing => pilot.steer(&frame),
            _ => InputState::default(),
        };
        let report = session.tick(TICK_MS, &input);
        if !report.simulated {
            continue;
        }

        let snapshot = session.snapshot(true);
        let Some(frame) = snapshot.frame else {
            continue;
        };
        let walls = session
            .engine()
            .map(|engine| engine.walls().to_vec())
            .unwrap_or_default();
        for message in collect_frame_anomalies(&frame, last_score, &walls) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                message,
            );
        }
        last_score = frame.score;
        result.level_reached = result.level_reached.max(frame.level);

        for event in &frame.events {
            match event {
                GameEvent::DotEaten { .. } => result.dots_eaten += 1,
                GameEvent::PelletTaken { .. } => result.pellets_taken += 1,
                GameEvent::GhostEaten { .. } => result.ghosts_eaten += 1,
                GameEvent::LevelCleared { .. } => result.levels_cleared += 1,
                _ => {}
            }
        }

        if report.entered == Some(Phase::GameOver) {
            let caught = frame
                .events
                .iter()
                .any(|event| matches!(event, GameEvent::PlayerCaught { .. }));
            result.outcome = if caught { "caught" } else { "ended" }.to_string();
            break;
        }
    }

    let frame = session.engine().map(|engine| {
        let board = engine.board();
        let mut surface = RasterSurface::new(board.width as usize, board.height as usize);
        session.render(&mut surface);
        surface
    });

    result.final_score = session.session().score;
    result.ticks = tick;
    result.duration_ms = session.now_ms();
    if session.phase() == Phase::GameOver {
        result.submitted = session.submit_score().await.is_ok();
        // Let the display delay run out so the gate re-arms.
        let mut waited = 0u32;
        while session.phase() == Phase::GameOver && waited < GAME_OVER_WAIT_TICKS {
            session.tick(TICK_MS, &InputState::default());
            waited += 1;
        }
        if session.phase() != Phase::AwaitingPayment {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                format!("session stuck in {:?} after game over", session.phase()),
            );
        }
    }

    result.anomalies = anomalies;
    ScenarioRunResult {
        result,
        anomaly_records,
        frame,
    }
}

/// Greedy bot: runs from close hostile ghosts, otherwise heads for the
/// nearest item and picks a random heading when it stops moving.
struct Autopilot {
    rng: Rng,
    last_pos: Option<Vec2>,
    stuck: u32,
    detour: Option<(Direction, u32)>,
}

impl Autopilot {
    fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed),
            last_pos: None,
            stuck: 0,
            detour: None,
        }
    }

    fn steer(&mut self, frame: &FrameSnapshot) -> InputState {
        let pos = frame.player.pos;
        if self.last_pos == Some(pos) {
            self.stuck += 1;
        } else {
            self.stuck = 0;
        }
        self.last_pos = Some(pos);

        if self.stuck >= STUCK_TICKS && self.detour.is_none() {
            let dir = Direction::ALL[self.rng.pick_index(Direction::ALL.len())];
            self.detour = Some((dir, 20));
            self.stuck = 0;
        }
        if let Some((dir, remaining)) = self.detour {
            self.detour = (remaining > 1).then_some((dir, remaining - 1));
            return InputState::holding(dir);
        }

        let threat = frame
            .ghosts
            .iter()
            .filter(|ghost| !ghost.vulnerable)
            .map(|ghost| Vec2::new(ghost.x, ghost.y))
            .filter(|ghost| ghost.distance(pos) < GHOST_DANGER_RADIUS)
            .min_by(|a, b| a.distance(pos).total_cmp(&b.distance(pos)));
        if let Some(ghost) = threat {
            let away = Vec2::new(pos.x * 2.0 - ghost.x, pos.y * 2.0 - ghost.y);
            if let Some(dir) = heading(pos, away) {
                return InputState::holding(dir);
            }
        }

        let target = frame
            .dots
            .iter()
            .map(|dot| dot.pos)
            .chain(frame.power_pellets.iter().map(|pellet| pellet.pos))
            .min_by(|a, b| a.distance(pos).total_cmp(&b.distance(pos)));
        match target.and_then(|target| heading(pos, target)) {
            Some(dir) => InputState::holding(dir),
            None => InputState::default(),
        }
    }
}

fn heading(from: Vec2, to: Vec2) -> Option<Direction> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx.abs() < 1.0 && dy.abs() < 1.0 {
        return None;
    }
    Some(if dx.abs() >= dy.abs() {
        if dx > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if dy > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    })
}

fn collect_frame_anomalies(frame: &FrameSnapshot, last_score: u32, walls: &[Rect]) -> Vec<String> {
    let mut anomalies = Vec::new();
    if frame.score < last_score {
        anomalies.push(format!("score decreased: {last_score} -> {}", frame.score));
    }

    for dot in &frame.dots {
        if within_any_expanded_wall(dot.pos, dot.radius, walls) {
            anomalies.push(format!("dot inside wall: ({}, {})", dot.pos.x, dot.pos.y));
        }
    }
    for pellet in &frame.power_pellets {
        if within_any_expanded_wall(pellet.pos, pellet.radius, walls) {
            anomalies.push(format!(
                "power pellet inside wall: ({}, {})",
                pellet.pos.x, pellet.pos.y
            ));
        }
    }

    let board = Board::default();
    if !board.contains(frame.player.pos) {
        anomalies.push("player off board".to_string());
    }
    for ghost in &frame.ghosts {
        if !board.contains(Vec2::new(ghost.x, ghost.y)) {
            anomalies.push(format!("ghost off board: {}", ghost.id));
        }
        let expected = if ghost.vulnerable {
            Color::FRIGHTENED_BLUE
        } else {
            GHOST_SLOT_COLORS[ghost.slot % GHOST_SLOT_COLORS.len()]
        };
        if ghost.color != expected.hex() {
            anomalies.push(format!(
                "ghost colour mismatch: {} is {} (vulnerable={})",
                ghost.id, ghost.color, ghost.vulnerable
            ));
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    (0..cli.games.clamp(1, 100))
        .map(|idx| Scenario {
            name: format!("autopilot-{}", idx + 1),
            seed: seed.wrapping_add(idx),
            user_id: 1_000 + idx as u64,
        })
        .collect()
}

/// Folds the high half in so 64-bit seeds that differ only above bit 31
/// still give different runs.
fn normalize_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    leaderboard: Value,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let total_score: u64 = scenarios.iter().map(|s| s.final_score as u64).sum();
    let average_score = if scenario_count == 0 {
        0
    } else {
        (total_score / scenario_count as u64) as u32
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_score,
        outcome_counts,
        leaderboard,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    eprintln!(
        "{}",
        serde_json::to_string(&log_line).expect("structured log should serialize")
    );
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, summary_text)
}

fn write_frame(path: &Path, frame: &RasterSurface) -> anyhow::Result<()> {
    std::fs::write(path, frame.to_ppm())
        .with_context(|| format!("failed to write frame to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacman_arcade_server::types::{Dot, GhostView, Player};

    fn make_scenario_result(outcome: &str, final_score: u32) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            outcome: outcome.to_string(),
            final_score,
            level_reached: 1,
            ticks: 100,
            duration_ms: 1_600,
            dots_eaten: 0,
            pellets_taken: 0,
            ghosts_eaten: 0,
            levels_cleared: 0,
            submitted: true,
            anomalies: Vec::new(),
        }
    }

    fn frame(score: u32) -> FrameSnapshot {
        FrameSnapshot {
            tick: 1,
            now_ms: 16,
            level: 1,
            score,
            player: Player {
                pos: Vec2::new(50.0, 50.0),
                size: 30.0,
                speed: 5.0,
                dir: Direction::Right,
                mouth_open: true,
            },
            ghosts: vec![GhostView {
                id: 1,
                slot: 0,
                x: 260.0,
                y: 200.0,
                size: 25.0,
                dir: Direction::Left,
                vulnerable: false,
                color: GHOST_SLOT_COLORS[0].hex(),
            }],
            dots: vec![Dot {
                pos: Vec2::new(200.0, 400.0),
                radius: 5.0,
                value: 10,
            }],
            power_pellets: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn normalize_seed_keeps_high_bits() {
        assert_eq!(normalize_seed(42), 42);
        assert_ne!(normalize_seed(7), normalize_seed(7 | (1 << 40)));
        assert_ne!(normalize_seed(1 << 32), 0);
    }

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_score() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result("caught", 600),
                make_scenario_result("tick_limit", 900),
            ],
            BTreeMap::from([
                ("caught".to_string(), 1usize),
                ("tick_limit".to_string(), 1usize),
            ]),
            0,
            json!([]),
        );
        assert_eq!(summary.average_score, 750);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("pacman-arcade-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result("caught", 10)],
            BTreeMap::from([("caught".to_string(), 1usize)]),
            0,
            json!([]),
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same".to_string());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn healthy_frame_has_no_anomalies() {
        let walls = pacman_arcade_server::level::build_walls(Board::default());
        assert!(collect_frame_anomalies(&frame(20), 10, &walls).is_empty());
    }

    #[test]
    fn frame_anomalies_flag_score_drop_and_colour_mismatch() {
        let walls = pacman_arcade_server::level::build_walls(Board::default());
        let mut bad = frame(5);
        bad.ghosts[0].vulnerable = true;
        bad.dots.push(Dot {
            pos: Vec2::new(10.0, 10.0),
            radius: 5.0,
            value: 10,
        });
        let anomalies = collect_frame_anomalies(&bad, 10, &walls);
        assert!(anomalies.iter().any(|a| a.starts_with("score decreased")));
        assert!(anomalies.iter().any(|a| a.starts_with("ghost colour mismatch")));
        assert!(anomalies.iter().any(|a| a.starts_with("dot inside wall")));
    }

    #[test]
    fn heading_prefers_larger_axis() {
        let origin = Vec2::new(100.0, 100.0);
        assert_eq!(heading(origin, Vec2::new(90.0, 140.0)), Some(Direction::Down));
        assert_eq!(heading(origin, Vec2::new(160.0, 140.0)), Some(Direction::Right));
        assert_eq!(heading(origin, origin), None);
    }

    #[tokio::test]
    async fn autopilot_game_finishes_without_anomalies() {
        let ledger = InMemoryLedger::instant();
        let scenario = Scenario {
            name: "test".to_string(),
            seed: 2024,
            user_id: 1,
        };
        let run = run_scenario(&scenario, &ledger, 3_000).await;
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
        assert!(run.frame.is_some());
        assert!(run.result.ticks > 0);
    }
}
