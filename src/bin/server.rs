use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pacman_arcade_server::auth::{Auth, Identity, StaticAuth};
use pacman_arcade_server::config::ServerConfig;
use pacman_arcade_server::constants::{BOARD_HEIGHT, BOARD_WIDTH, ENTRY_FEE_LABEL, TICK_MS};
use pacman_arcade_server::input::InputState;
use pacman_arcade_server::leaderboard_store::LeaderboardStore;
use pacman_arcade_server::ledger::{InMemoryLedger, Ledger, LedgerBehavior};
use pacman_arcade_server::server_protocol::{parse_client_message, ParsedClientMessage};
use pacman_arcade_server::server_utils::{
    normalize_leaderboard_limit, parse_leaderboard_limit, sanitize_name,
};
use pacman_arcade_server::session::{AppContext, ArcadeSession, SessionError};
use pacman_arcade_server::storage::JsonFileStore;
use pacman_arcade_server::types::Phase;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<ServerState>;

struct ServerState {
    ledger: InMemoryLedger,
    debug_pay_override: bool,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let store = JsonFileStore::new(config.leaderboard_path.clone());
    info!(path = %store.path().display(), "leaderboard store opened");
    let board = LeaderboardStore::new(Box::new(store)).with_placeholders(config.seed_leaderboard);
    let ledger = InMemoryLedger::new(
        board,
        LedgerBehavior {
            latency_ms: config.ledger_latency_ms,
            ..LedgerBehavior::default()
        },
    );
    if config.debug_pay_override {
        warn!("debug payment override is enabled");
    }
    let state = Arc::new(ServerState {
        ledger,
        debug_pay_override: config.debug_pay_override,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = config.resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving the API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port = config.port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let board = state.ledger.board();
    let guard = board.lock().await;
    Json(guard.build_response(parse_leaderboard_limit(query.limit.as_deref())))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// One socket drives one arcade session: client messages and the 60 Hz tick
/// are handled in this task, so ticks never overlap.
async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);
    info!(client_id = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    let mut client = Client {
        id: client_id.clone(),
        tx,
        session: None,
        input: InputState::default(),
        closing: false,
    };
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !client.closing {
        tokio::select! {
            received = ws_receiver.next() => {
                let Some(Ok(message)) = received else {
                    break;
                };
                match message {
                    Message::Text(raw) => client.handle_message(&state, raw.as_str()).await,
                    Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                        Ok(text) => client.handle_message(&state, &text).await,
                        Err(_) => client.send_error("invalid utf8 message"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = interval.tick() => client.tick().await,
        }
    }

    info!(client_id = %client_id, "client disconnected");
    drop(client);
    let _ = writer.await;
}

struct Client {
    id: String,
    tx: mpsc::Sender<OutboundMessage>,
    session: Option<ArcadeSession>,
    input: InputState,
    closing: bool,
}

impl Client {
    async fn handle_message(&mut self, state: &SharedState, raw: &str) {
        let Some(message) = parse_client_message(raw) else {
            self.send_error("invalid message");
            return;
        };

        match message {
            ParsedClientMessage::Hello { user_id, name } => self.handle_hello(state, user_id, &name),
            ParsedClientMessage::Leaderboard { limit } => {
                let limit = normalize_leaderboard_limit(limit);
                match state.ledger.get_top_players(limit).await {
                    Ok(entries) => self.send(
                        &json!({ "type": "leaderboard", "entries": entries }),
                        QueuePolicy::DisconnectOnFull,
                    ),
                    Err(error) => {
                        warn!(client_id = %self.id, %error, "leaderboard query failed");
                        self.send_error("leaderboard unavailable");
                    }
                }
            }
            ParsedClientMessage::Pay => {
                let Some(session) = self.session.as_mut() else {
                    self.send_error("send hello first");
                    return;
                };
                if let Err(error) = session.pay().await {
                    debug!(client_id = %self.id, %error, "payment not completed");
                }
                self.send_state(QueuePolicy::DisconnectOnFull);
            }
            ParsedClientMessage::DebugPay => {
                let Some(session) = self.session.as_mut() else {
                    self.send_error("send hello first");
                    return;
                };
                match session.debug_pay() {
                    Ok(()) => self.send_state(QueuePolicy::DisconnectOnFull),
                    Err(error) => self.send_error(&error.to_string()),
                }
            }
            ParsedClientMessage::Start => {
                let Some(session) = self.session.as_mut() else {
                    self.send_error("send hello first");
                    return;
                };
                self.input.release_all();
                match session.start() {
                    Ok(()) => self.send_level(),
                    Err(SessionError::NotPaid) => {}
                    Err(error) => {
                        self.send_error(&error.to_string());
                        return;
                    }
                }
                self.send_state(QueuePolicy::DisconnectOnFull);
            }
            ParsedClientMessage::Input { dir, pressed } => match dir {
                Some(dir) => self.input.set(dir, pressed),
                None => self.input.release_all(),
            },
            ParsedClientMessage::Swipe { dx, dy } => {
                self.input.apply_swipe(dx, dy);
            }
        }
    }

    fn handle_hello(&mut self, state: &SharedState, user_id: Option<u64>, name: &str) {
        if self.session.is_some() {
            self.send_error("already joined");
            return;
        }

        let auth = match user_id {
            Some(user_id) => StaticAuth::signed_in(Identity {
                user_id,
                display_name: sanitize_name(name),
            }),
            None => StaticAuth::signed_out(None),
        };
        let auth: Arc<dyn Auth> = Arc::new(auth);
        let ctx = AppContext {
            auth,
            ledger: Arc::new(state.ledger.clone()),
            debug_pay_override: state.debug_pay_override,
        };
        self.session = Some(ArcadeSession::new(ctx, rand::random::<u32>()));
        info!(client_id = %self.id, user_id = ?user_id, "session opened");

        self.send(
            &json!({
                "type": "welcome",
                "clientId": self.id,
                "entryFee": ENTRY_FEE_LABEL,
                "board": { "width": BOARD_WIDTH, "height": BOARD_HEIGHT },
                "tickMs": TICK_MS,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        self.send_state(QueuePolicy::DisconnectOnFull);
    }

    async fn tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let report = session.tick(TICK_MS, &self.input);

        if report.level_loaded {
            self.send_level();
        }
        if report.entered == Some(Phase::GameOver) {
            self.input.release_all();
            self.send_state(QueuePolicy::DisconnectOnFull);
            if let Some(session) = self.session.as_mut() {
                if let Err(error) = session.submit_score().await {
                    warn!(client_id = %self.id, %error, "score submission failed");
                }
            }
            self.send_state(QueuePolicy::DisconnectOnFull);
            return;
        }
        if report.entered.is_some() {
            self.send_state(QueuePolicy::DisconnectOnFull);
        } else if report.simulated && !report.skip_render {
            self.send_state(QueuePolicy::DropOnFull);
        }
    }

    fn send_level(&mut self) {
        let Some(init) = self.session.as_ref().and_then(ArcadeSession::level_init) else {
            return;
        };
        self.send(
            &json!({ "type": "level", "level": init }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn send_state(&mut self, policy: QueuePolicy) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let snapshot = session.snapshot(true);
        self.send(&json!({ "type": "state", "snapshot": snapshot }), policy);
    }

    fn send_error(&mut self, message: &str) {
        self.send(
            &json!({ "type": "error", "message": message }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    fn send(&mut self, message: &Value, policy: QueuePolicy) {
        let failed = self
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err();
        if failed && policy == QueuePolicy::DisconnectOnFull {
            warn!(client_id = %self.id, "outbound queue full, disconnecting");
            let _ = self.tx.try_send(OutboundMessage::Close {
                code: 1013,
                reason: "client too slow".to_string(),
            });
            self.closing = true;
        }
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
