use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::SqlitePool;

use config::Config;

pub mod config;
pub mod db;
pub mod matcher;
pub mod middleware;
pub mod notify;
pub mod users;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub http: reqwest::Client,
}
