use crate::constants::{DEFAULT_LEADERBOARD_SIZE, MAX_LEADERBOARD_SIZE};

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

pub fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}

pub fn normalize_leaderboard_limit(value: Option<i64>) -> usize {
    match value {
        None => DEFAULT_LEADERBOARD_SIZE,
        Some(limit) => limit.clamp(1, MAX_LEADERBOARD_SIZE as i64) as usize,
    }
}
