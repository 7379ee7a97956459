pub mod auth;
pub mod config;
pub mod constants;
pub mod engine;
pub mod geometry;
pub mod input;
pub mod leaderboard_store;
pub mod ledger;
pub mod level;
pub mod render;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod storage;
pub mod timers;
pub mod types;
