use std::path::PathBuf;

use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(name = "server", about = "Pay-to-play Pac-Man arcade server")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "LEADERBOARD_DB_PATH", default_value = ".data/leaderboard.json")]
    pub leaderboard_path: PathBuf,

    /// Directory with a built client; must contain index.html.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Confirmation delay of the in-process ledger.
    #[arg(long, env = "LEDGER_LATENCY_MS", default_value_t = 1_000)]
    pub ledger_latency_ms: u64,

    /// Lets clients mark a session paid without a ledger transaction.
    #[arg(long, env = "DEBUG_OVERRIDE", default_value_t = false)]
    pub debug_pay_override: bool,

    #[arg(long, env = "SEED_LEADERBOARD", default_value_t = false)]
    pub seed_leaderboard: bool,
}

impl ServerConfig {
    pub fn resolve_static_dir(&self) -> Option<PathBuf> {
        if let Some(path) = &self.static_dir {
            if path.join("index.html").is_file() {
                return Some(path.clone());
            }
        }

        let candidates = [PathBuf::from("dist/client"), PathBuf::from("public")];
        candidates
            .into_iter()
            .find(|path| path.join("index.html").is_file())
    }
}
