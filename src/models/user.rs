// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'users' table in the database.
///
/// `xp` and `level` are mutated only by the scoring engine, inside the
/// same transaction that records the attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub username: String,

    /// Cumulative experience points.
    pub xp: i64,

    /// Derived from `xp` by a monotonic curve; stored for cheap reads.
    pub level: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregated profile data for the current user.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub xp: i64,
    pub level: i64,
    pub attempts_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}
