// src/state.rs

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{config::Config, judge::JudgeClient, session::QuizSession};

/// One live session behind its own lock. The per-session mutex
/// serializes the deadline task, tamper events and manual submits, so
/// the machine's finalize latch decides the winner deterministically.
pub type SharedSession = Arc<Mutex<QuizSession>>;

/// In-memory map of live proctored sessions. Runtime state is never
/// persisted; a finalized session is removed and discarded.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: QuizSession) -> SharedSession {
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));
        self.inner.write().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) {
        self.inner.write().await.remove(id);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub sessions: SessionStore,
    pub judge: JudgeClient,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SessionStore {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for JudgeClient {
    fn from_ref(state: &AppState) -> Self {
        state.judge.clone()
    }
}
