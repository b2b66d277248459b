// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    /// Base URL of the Judge0-compatible code execution service.
    pub judge_url: String,
    pub judge_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let judge_url =
            env::var("JUDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:2358".to_string());

        let judge_api_key = env::var("JUDGE_API_KEY").ok();

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            judge_url,
            judge_api_key,
        }
    }
}
