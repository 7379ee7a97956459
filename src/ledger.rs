use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use rand::distr::Alphanumeric;
use rand::Rng as _;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::leaderboard_store::LeaderboardStore;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::types::LeaderboardEntry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    Rejected(String),
    Unavailable(String),
    Reverted(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Rejected(reason) => write!(f, "transaction rejected: {reason}"),
            LedgerError::Unavailable(reason) => write!(f, "ledger unavailable: {reason}"),
            LedgerError::Reverted(reason) => write!(f, "transaction reverted: {reason}"),
        }
    }
}

impl std::error::Error for LedgerError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub confirmed_at_iso: String,
}

/// A submitted transaction. Submission succeeded; confirmation may still fail.
pub struct TransactionHandle {
    pub hash: String,
    confirmation: BoxFuture<'static, Result<Receipt, LedgerError>>,
}

impl TransactionHandle {
    pub fn new(
        hash: String,
        confirmation: BoxFuture<'static, Result<Receipt, LedgerError>>,
    ) -> Self {
        Self { hash, confirmation }
    }

    pub async fn wait(self) -> Result<Receipt, LedgerError> {
        self.confirmation.await
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn pay_fee(
        &self,
        user_id: u64,
        display_name: &str,
    ) -> Result<TransactionHandle, LedgerError>;

    async fn submit_score(&self, user_id: u64, score: u32)
        -> Result<TransactionHandle, LedgerError>;

    async fn get_top_players(&self, n: usize) -> Result<Vec<LeaderboardEntry>, LedgerError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerBehavior {
    pub latency_ms: u64,
    pub reject_payment: bool,
    pub revert_payment: bool,
    pub reject_submission: bool,
    pub revert_submission: bool,
    pub unavailable: bool,
}

/// Ledger kept in process memory. Fees and scores reach the leaderboard when
/// their transaction confirms, `latency_ms` after submission.
#[derive(Clone)]
pub struct InMemoryLedger {
    board: Arc<Mutex<LeaderboardStore>>,
    behavior: Arc<Mutex<LedgerBehavior>>,
}

impl InMemoryLedger {
    pub fn new(board: LeaderboardStore, behavior: LedgerBehavior) -> Self {
        Self {
            board: Arc::new(Mutex::new(board)),
            behavior: Arc::new(Mutex::new(behavior)),
        }
    }

    pub fn with_store(store: Box<dyn KeyValueStore>, behavior: LedgerBehavior) -> Self {
        Self::new(LeaderboardStore::new(store), behavior)
    }

    pub fn instant() -> Self {
        Self::with_store(Box::new(MemoryStore::new()), LedgerBehavior::default())
    }

    pub async fn set_behavior(&self, behavior: LedgerBehavior) {
        *self.behavior.lock().await = behavior;
    }

    pub fn board(&self) -> Arc<Mutex<LeaderboardStore>> {
        Arc::clone(&self.board)
    }

    async fn behavior(&self) -> LedgerBehavior {
        *self.behavior.lock().await
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn pay_fee(
        &self,
        user_id: u64,
        display_name: &str,
    ) -> Result<TransactionHandle, LedgerError> {
        let behavior = self.behavior().await;
        if behavior.unavailable {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        if behavior.reject_payment {
            return Err(LedgerError::Rejected("payment declined".to_string()));
        }

        let hash = tx_hash();
        info!(user_id, tx = %hash, "entry fee submitted");
        let board = Arc::clone(&self.board);
        let display_name = display_name.to_string();
        let tx = hash.clone();
        let confirmation = async move {
            confirm_after(behavior.latency_ms).await;
            if behavior.revert_payment {
                return Err(LedgerError::Reverted("fee transfer failed".to_string()));
            }
            board
                .lock()
                .await
                .record_payment(user_id, &display_name)
                .map_err(|error| LedgerError::Unavailable(error.to_string()))?;
            Ok(receipt(tx))
        }
        .boxed();
        Ok(TransactionHandle::new(hash, confirmation))
    }

    async fn submit_score(
        &self,
        user_id: u64,
        score: u32,
    ) -> Result<TransactionHandle, LedgerError> {
        let behavior = self.behavior().await;
        if behavior.unavailable {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        if behavior.reject_submission {
            return Err(LedgerError::Rejected("score rejected".to_string()));
        }

        let hash = tx_hash();
        info!(user_id, score, tx = %hash, "score submitted");
        let board = Arc::clone(&self.board);
        let tx = hash.clone();
        let confirmation = async move {
            confirm_after(behavior.latency_ms).await;
            if behavior.revert_submission {
                return Err(LedgerError::Reverted("score write failed".to_string()));
            }
            let improved = board
                .lock()
                .await
                .record_score(user_id, score)
                .map_err(|error| LedgerError::Unavailable(error.to_string()))?;
            debug!(user_id, score, improved, "score confirmed");
            Ok(receipt(tx))
        }
        .boxed();
        Ok(TransactionHandle::new(hash, confirmation))
    }

    async fn get_top_players(&self, n: usize) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        if self.behavior().await.unavailable {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        Ok(self.board.lock().await.top(n))
    }
}

async fn confirm_after(latency_ms: u64) {
    if latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    }
}

fn tx_hash() -> String {
    let body: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("0x{}", body.to_lowercase())
}

fn receipt(tx_hash: String) -> Receipt {
    Receipt {
        tx_hash,
        confirmed_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}
