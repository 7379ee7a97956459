use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::auth::Auth;
use crate::constants::{ENTRY_FEE_LABEL, GAME_OVER_DISPLAY_MS, LEVEL_TRANSITION_MS};
use crate::engine::{GameEngine, StepOutcome};
use crate::input::InputState;
use crate::ledger::{Ledger, LedgerError};
use crate::level::{Board, LevelError};
use crate::render::{draw_frame, Surface};
use crate::rng::Rng;
use crate::timers::TimerQueue;
use crate::types::{GameSession, LeaderboardEntry, LevelInit, Phase, SessionSnapshot};

/// Collaborators shared by every session of a host.
#[derive(Clone)]
pub struct AppContext {
    pub auth: Arc<dyn Auth>,
    pub ledger: Arc<dyn Ledger>,
    pub debug_pay_override: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionError {
    NotPaid,
    InvalidPhase { expected: Phase, actual: Phase },
    SignInFailed,
    MissingIdentity,
    DebugOverrideDisabled,
    Ledger(LedgerError),
    Level(LevelError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotPaid => write!(f, "entry fee not paid"),
            SessionError::InvalidPhase { expected, actual } => {
                write!(f, "expected phase {expected:?}, session is {actual:?}")
            }
            SessionError::SignInFailed => write!(f, "sign-in failed"),
            SessionError::MissingIdentity => write!(f, "no user identity available"),
            SessionError::DebugOverrideDisabled => write!(f, "debug payment override disabled"),
            SessionError::Ledger(error) => write!(f, "{error}"),
            SessionError::Level(error) => write!(f, "level generation failed: {error}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LedgerError> for SessionError {
    fn from(error: LedgerError) -> Self {
        SessionError::Ledger(error)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionTimer {
    LevelTransitionDone,
    GameOverDelayDone,
}

/// What a call to [`ArcadeSession::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The engine advanced this tick.
    pub simulated: bool,
    /// A level transition finished and a fresh layout is in place.
    pub level_loaded: bool,
    /// The tick hit a simulation error; nothing should be drawn for it.
    pub skip_render: bool,
    pub entered: Option<Phase>,
}

/// One player's pay → start → play → game over cycle, driven by `tick`
/// on a virtual clock.
pub struct ArcadeSession {
    ctx: AppContext,
    phase: Phase,
    session: GameSession,
    message: Option<String>,
    engine: Option<GameEngine>,
    now_ms: u64,
    timers: TimerQueue<SessionTimer>,
    pending_submission: bool,
    seeds: Rng,
}

impl ArcadeSession {
    pub fn new(ctx: AppContext, seed: u32) -> Self {
        Self {
            ctx,
            phase: Phase::AwaitingPayment,
            session: GameSession::default(),
            message: Some(format!("Sign in and pay {ENTRY_FEE_LABEL} to play")),
            engine: None,
            now_ms: 0,
            timers: TimerQueue::new(),
            pending_submission: false,
            seeds: Rng::new(seed),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn engine(&self) -> Option<&GameEngine> {
        self.engine.as_ref()
    }

    pub fn level_init(&self) -> Option<LevelInit> {
        self.engine.as_ref().map(GameEngine::level_init)
    }

    pub async fn pay(&mut self) -> Result<(), SessionError> {
        self.expect_phase(Phase::AwaitingPayment)?;

        let auth = Arc::clone(&self.ctx.auth);
        if !auth.is_signed_in() && !auth.sign_in().await {
            self.message = Some("Failed to sign in. Please try again.".to_string());
            return Err(SessionError::SignInFailed);
        }
        let Some(identity) = auth.identity() else {
            self.message = Some("Could not get user information. Please try again.".to_string());
            return Err(SessionError::MissingIdentity);
        };

        let ledger = Arc::clone(&self.ctx.ledger);
        let confirmed = match ledger
            .pay_fee(identity.user_id, &identity.display_name)
            .await
        {
            Ok(handle) => handle.wait().await,
            Err(error) => Err(error),
        };
        match confirmed {
            Ok(receipt) => {
                info!(
                    user_id = identity.user_id,
                    tx = %receipt.tx_hash,
                    "entry fee confirmed"
                );
                self.mark_paid();
                Ok(())
            }
            Err(error) => {
                warn!(user_id = identity.user_id, %error, "entry fee failed");
                self.message = Some("Failed to process payment. Please try again.".to_string());
                Err(error.into())
            }
        }
    }

    /// Marks the session paid without touching the ledger. Only honoured when
    /// the host enabled the override.
    pub fn debug_pay(&mut self) -> Result<(), SessionError> {
        if !self.ctx.debug_pay_override {
            return Err(SessionError::DebugOverrideDisabled);
        }
        self.expect_phase(Phase::AwaitingPayment)?;
        warn!("payment gate bypassed by debug override");
        self.mark_paid();
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        if !self.session.paid {
            self.message = Some(format!("Please pay {ENTRY_FEE_LABEL} to play."));
            return Err(SessionError::NotPaid);
        }
        self.expect_phase(Phase::Ready)?;

        let seed = (self.seeds.next_f32() * u32::MAX as f32) as u32;
        let engine = GameEngine::with_board(1, Board::default(), Rng::new(seed))
            .map_err(|error| {
                error!(%error, "could not build the first level");
                SessionError::Level(error)
            })?;

        self.engine = Some(engine);
        self.timers.clear();
        self.pending_submission = false;
        self.session.started = true;
        self.session.over = false;
        self.session.score = 0;
        self.session.level = 1;
        self.phase = Phase::Playing;
        self.message = None;
        info!(seed, "game started");
        Ok(())
    }

    /// Advances the virtual clock by `dt_ms`, fires due timers and, while
    /// playing, simulates one tick.
    pub fn tick(&mut self, dt_ms: u64, input: &InputState) -> TickReport {
        let mut report = TickReport::default();
        self.now_ms = self.now_ms.saturating_add(dt_ms);
        while let Some(timer) = self.timers.pop_due(self.now_ms) {
            self.fire(timer, &mut report);
        }

        if self.phase != Phase::Playing {
            return report;
        }
        let result = match self.engine.as_mut() {
            Some(engine) => engine.step(dt_ms, input),
            None => return report,
        };
        report.simulated = true;
        if let Some(engine) = &self.engine {
            self.session.score = engine.score();
        }

        match result {
            Ok(StepOutcome::Running) => {}
            Ok(StepOutcome::LevelCleared) => {
                self.session.level += 1;
                self.phase = Phase::LevelTransition;
                self.message = Some(format!("Level {}", self.session.level));
                self.timers.schedule(
                    self.now_ms + LEVEL_TRANSITION_MS,
                    SessionTimer::LevelTransitionDone,
                );
                report.entered = Some(Phase::LevelTransition);
                info!(
                    level = self.session.level,
                    score = self.session.score,
                    "level cleared"
                );
            }
            Ok(StepOutcome::Caught { ghost_id }) => {
                info!(ghost_id, score = self.session.score, "player caught");
                self.enter_game_over(&mut report);
            }
            Err(error) => {
                report.skip_render = true;
                if error.is_recoverable() {
                    warn!(%error, "simulation tick recovered");
                } else {
                    error!(%error, "simulation tick failed, ending game");
                    self.enter_game_over(&mut report);
                }
            }
        }
        report
    }

    fn fire(&mut self, timer: SessionTimer, report: &mut TickReport) {
        match timer {
            SessionTimer::LevelTransitionDone => {
                if self.phase != Phase::LevelTransition {
                    return;
                }
                let level = self.session.level;
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                match engine.load_level(level) {
                    Ok(()) => {
                        self.phase = Phase::Playing;
                        self.message = None;
                        report.level_loaded = true;
                        report.entered = Some(Phase::Playing);
                    }
                    Err(error) => {
                        error!(level, %error, "could not build next level");
                        self.enter_game_over(report);
                    }
                }
            }
            SessionTimer::GameOverDelayDone => {
                if self.phase != Phase::GameOver {
                    return;
                }
                self.phase = Phase::AwaitingPayment;
                self.session.paid = false;
                self.session.over = false;
                self.message = Some(format!("Please pay {ENTRY_FEE_LABEL} to play."));
                report.entered = Some(Phase::AwaitingPayment);
            }
        }
    }

    fn enter_game_over(&mut self, report: &mut TickReport) {
        self.session.over = true;
        self.session.started = false;
        self.phase = Phase::GameOver;
        self.pending_submission = true;
        self.message = Some(format!("Game Over! Final Score: {}", self.session.score));
        report.entered = Some(Phase::GameOver);
    }

    /// Best-effort submission of the final score. Whatever the outcome, the
    /// session returns to the payment gate `GAME_OVER_DISPLAY_MS` later.
    pub async fn submit_score(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::GameOver || !self.pending_submission {
            return Ok(());
        }
        self.pending_submission = false;
        self.timers.schedule(
            self.now_ms + GAME_OVER_DISPLAY_MS,
            SessionTimer::GameOverDelayDone,
        );

        let score = self.session.score;
        let identity = if self.ctx.auth.is_signed_in() {
            self.ctx.auth.identity()
        } else {
            None
        };
        let Some(identity) = identity else {
            warn!(score, "score not submitted, no signed-in user");
            return Err(SessionError::MissingIdentity);
        };

        let ledger = Arc::clone(&self.ctx.ledger);
        let confirmed = match ledger.submit_score(identity.user_id, score).await {
            Ok(handle) => handle.wait().await,
            Err(error) => Err(error),
        };
        match confirmed {
            Ok(receipt) => {
                info!(user_id = identity.user_id, score, tx = %receipt.tx_hash, "score confirmed");
                self.message = Some(format!("Game Over! Score submitted: {score}"));
                Ok(())
            }
            Err(error) => {
                warn!(user_id = identity.user_id, score, %error, "score submission failed");
                self.message =
                    Some("Game Over! Failed to submit score. Please try again.".to_string());
                Err(error.into())
            }
        }
    }

    pub async fn top_players(&self, n: usize) -> Result<Vec<LeaderboardEntry>, SessionError> {
        Ok(self.ctx.ledger.get_top_players(n).await?)
    }

    pub fn snapshot(&mut self, include_events: bool) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            session: self.session.clone(),
            message: self.message.clone(),
            frame: self
                .engine
                .as_mut()
                .map(|engine| engine.build_frame(include_events)),
        }
    }

    pub fn render<S: Surface + ?Sized>(&self, surface: &mut S) {
        if let Some(engine) = &self.engine {
            draw_frame(surface, engine);
        }
    }

    fn mark_paid(&mut self) {
        self.session.paid = true;
        self.phase = Phase::Ready;
        self.message = Some("Payment successful! Press start to play.".to_string());
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), SessionError> {
        if self.phase != expected {
            return Err(SessionError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }
}
