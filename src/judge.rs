// src/judge.rs
//
// Client for a Judge0-compatible code execution service. The contract
// is submit -> token, then poll the token on a fixed interval until the
// status id passes 2 (terminal) or the wait bound is exceeded, which is
// a hard timeout rather than a silent partial result.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::AppError;
use crate::models::daily::CodeTestCase;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Judge0 status ids 1 (in queue) and 2 (processing) are non-terminal;
/// 3 is Accepted, everything above is some flavor of failure.
const STATUS_ACCEPTED: i64 = 3;

#[derive(Debug)]
pub enum JudgeError {
    /// Polling exceeded the maximum wait.
    Timeout,
    Http(reqwest::Error),
    /// The service answered with something we cannot use.
    Malformed(String),
}

impl fmt::Display for JudgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeError::Timeout => write!(f, "Judge did not finish within the wait bound"),
            JudgeError::Http(e) => write!(f, "Judge request failed: {}", e),
            JudgeError::Malformed(msg) => write!(f, "Judge returned a malformed result: {}", msg),
        }
    }
}

impl std::error::Error for JudgeError {}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JudgeError::Malformed(err.to_string())
        } else {
            JudgeError::Http(err)
        }
    }
}

impl From<JudgeError> for AppError {
    fn from(err: JudgeError) -> Self {
        match err {
            JudgeError::Timeout => AppError::GatewayTimeout(err.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JudgeSubmission {
    pub source_code: String,
    pub language_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JudgeToken {
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeStatus {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeResult {
    pub status: JudgeStatus,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
}

impl JudgeResult {
    pub fn is_terminal(&self) -> bool {
        self.status.id > 2
    }

    pub fn is_accepted(&self) -> bool {
        self.status.id == STATUS_ACCEPTED
    }
}

/// Outcome of one test case, with captured output so a failing case is
/// reported rather than aborting the rest of the run.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResult {
    pub passed: bool,
    pub stdout: Option<String>,
    pub error: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct JudgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl JudgeClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Overrides the polling cadence; used by tests to keep runs short.
    pub fn with_timing(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-Auth-Token", key),
            None => req,
        }
    }

    /// Submits one run; returns the polling token.
    pub async fn submit(&self, submission: &JudgeSubmission) -> Result<String, JudgeError> {
        let url = format!("{}/submissions?base64_encoded=false&wait=false", self.base_url);
        let resp = self
            .with_auth(self.client.post(&url))
            .json(submission)
            .send()
            .await?
            .error_for_status()?;

        let token: JudgeToken = resp.json().await?;
        Ok(token.token)
    }

    /// Polls a token every `poll_interval` until a terminal status,
    /// bounded by `max_wait`.
    pub async fn wait_for(&self, token: &str) -> Result<JudgeResult, JudgeError> {
        let url = format!(
            "{}/submissions/{}?base64_encoded=false",
            self.base_url, token
        );
        let deadline = Instant::now() + self.max_wait;

        loop {
            let resp = self
                .with_auth(self.client.get(&url))
                .send()
                .await?
                .error_for_status()?;
            let result: JudgeResult = resp.json().await?;

            if result.is_terminal() {
                return Ok(result);
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(JudgeError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Runs one submit/poll cycle per test case and aggregates the
    /// outcomes. A failed or timed-out case is captured with its error
    /// text; evaluation of the remaining cases continues.
    pub async fn run_test_cases(
        &self,
        source_code: &str,
        language_id: i64,
        cases: &[CodeTestCase],
    ) -> Vec<TestCaseResult> {
        let mut results = Vec::with_capacity(cases.len());

        for case in cases {
            let submission = JudgeSubmission {
                source_code: source_code.to_string(),
                language_id,
                stdin: Some(case.stdin.clone()),
                expected_output: Some(case.expected_output.clone()),
            };

            let outcome = match self.submit(&submission).await {
                Ok(token) => self.wait_for(&token).await,
                Err(e) => Err(e),
            };

            results.push(match outcome {
                Ok(result) => {
                    let passed = result.is_accepted();
                    let error = result
                        .stderr
                        .clone()
                        .filter(|s| !s.is_empty())
                        .or_else(|| result.compile_output.clone().filter(|s| !s.is_empty()));
                    TestCaseResult {
                        passed,
                        stdout: result.stdout,
                        error,
                        status: result
                            .status
                            .description
                            .unwrap_or_else(|| format!("status {}", result.status.id)),
                    }
                }
                Err(e) => {
                    tracing::warn!("Judge test case failed: {}", e);
                    TestCaseResult {
                        passed: false,
                        stdout: None,
                        error: Some(e.to_string()),
                        status: "error".to_string(),
                    }
                }
            });
        }

        results
    }
}
