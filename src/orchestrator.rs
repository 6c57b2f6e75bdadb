use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{NewReviewRecord, ReviewRecord, ReviewRequest, StartReviewRequest};
use crate::review::{ReviewError, Reviewer};
use crate::session::Session;
use crate::store::ReviewGateway;

/// Review progress for one pull request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewState {
    Idle,
    Requesting,
    /// Review generated and saved
    Succeeded { record: ReviewRecord },
    /// Review generated and shown, but saving it failed
    PartiallySucceeded { content: String, error: String },
    Failed { message: String },
}

/// The review currently selected for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectedReview {
    Saved(ReviewRecord),
    Unsaved { pr_id: String, content: String },
}

/// Snapshot of a board, as returned to the browser
#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub states: BTreeMap<String, ReviewState>,
    pub selected: Option<SelectedReview>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("A review of pull request {0} is already in progress")]
    AlreadyInFlight(String),

    #[error("Pull request {0} has already been reviewed; reset it to request another review")]
    AlreadyReviewed(String),

    #[error("Review of pull request {pr_id} timed out after {secs} seconds")]
    TimedOut { pr_id: String, secs: u64 },
}

#[derive(Default)]
struct BoardInner {
    states: HashMap<String, ReviewState>,
    in_flight: HashMap<String, CancellationToken>,
    selected: Option<SelectedReview>,
}

/// Per-user review states keyed by pull request id.
///
/// Entering `Requesting` is a check-and-set under the board lock, so at most
/// one request per pull request is in flight no matter how many callers race.
#[derive(Default)]
pub struct ReviewBoard {
    inner: Mutex<BoardInner>,
}

impl ReviewBoard {
    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, pr_id: &str) -> ReviewState {
        self.lock()
            .states
            .get(pr_id)
            .cloned()
            .unwrap_or(ReviewState::Idle)
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        let inner = self.lock();
        BoardSnapshot {
            states: inner
                .states
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            selected: inner.selected.clone(),
        }
    }

    /// Drop the selection if it shows the given saved record
    pub fn deselect_record(&self, id: Uuid) {
        let mut inner = self.lock();
        if matches!(&inner.selected, Some(SelectedReview::Saved(r)) if r.id == id) {
            inner.selected = None;
        }
    }

    fn begin(&self, pr_id: &str) -> Result<CancellationToken, OrchestratorError> {
        let mut inner = self.lock();

        match inner.states.get(pr_id) {
            Some(ReviewState::Requesting) => {
                return Err(OrchestratorError::AlreadyInFlight(pr_id.to_string()))
            }
            Some(ReviewState::Succeeded { .. }) => {
                return Err(OrchestratorError::AlreadyReviewed(pr_id.to_string()))
            }
            _ => {}
        }

        let token = CancellationToken::new();
        inner
            .states
            .insert(pr_id.to_string(), ReviewState::Requesting);
        inner.in_flight.insert(pr_id.to_string(), token.clone());

        Ok(token)
    }

    fn settle(&self, pr_id: &str, state: ReviewState, selected: Option<SelectedReview>) {
        let mut inner = self.lock();
        inner.in_flight.remove(pr_id);
        inner.states.insert(pr_id.to_string(), state);
        if selected.is_some() {
            inner.selected = selected;
        }
    }

    /// Cancel an in-flight request; false if none is running
    pub fn cancel(&self, pr_id: &str) -> bool {
        match self.lock().in_flight.get(pr_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Return a pull request to `Idle` so it can be reviewed again
    pub fn reset(&self, pr_id: &str) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        if inner.in_flight.contains_key(pr_id) {
            return Err(OrchestratorError::AlreadyInFlight(pr_id.to_string()));
        }
        inner.states.remove(pr_id);
        Ok(())
    }
}

/// Marks a request failed if its future is dropped before it settles
struct InFlight<'a> {
    board: &'a ReviewBoard,
    pr_id: &'a str,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, state: ReviewState, selected: Option<SelectedReview>) {
        self.board.settle(self.pr_id, state, selected);
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(pr_id = %self.pr_id, "Review request dropped before completion");
            self.board.settle(
                self.pr_id,
                ReviewState::Failed {
                    message: "Review request was interrupted".to_string(),
                },
                None,
            );
        }
    }
}

enum Interrupted {
    TimedOut,
    Cancelled,
}

/// Drives a review request from `Idle` to a settled state: generate the
/// review under a deadline, persist it, then select it for display.
pub struct ReviewOrchestrator {
    reviewer: Arc<dyn Reviewer>,
    gateway: ReviewGateway,
    deadline: Duration,
}

impl ReviewOrchestrator {
    pub fn new(reviewer: Arc<dyn Reviewer>, gateway: ReviewGateway, deadline: Duration) -> Self {
        Self {
            reviewer,
            gateway,
            deadline,
        }
    }

    pub async fn request_review(
        &self,
        session: &Session,
        pr: &StartReviewRequest,
    ) -> Result<ReviewState, OrchestratorError> {
        let board = session.board();
        let cancel = board.begin(&pr.pr_id)?;
        let in_flight = InFlight {
            board,
            pr_id: &pr.pr_id,
            settled: false,
        };

        info!(pr_id = %pr.pr_id, owner = %session.owner(), "Review requested");

        let request = ReviewRequest {
            url: pr.url.clone(),
            title: Some(pr.title.clone()),
        };

        // the deadline and cancellation cover the save as well as the review
        let work = async {
            let content = self.reviewer.review(Some(session), &request).await?;
            Ok::<_, ReviewError>(self.persist(session, pr, content).await)
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Interrupted::Cancelled),
            result = tokio::time::timeout(self.deadline, work) => {
                result.map_err(|_| Interrupted::TimedOut)
            }
        };

        let (state, selected) = match result {
            Err(Interrupted::Cancelled) => {
                info!(pr_id = %pr.pr_id, "Review cancelled");
                (
                    ReviewState::Failed {
                        message: "Review request was cancelled".to_string(),
                    },
                    None,
                )
            }
            Err(Interrupted::TimedOut) => {
                let error = OrchestratorError::TimedOut {
                    pr_id: pr.pr_id.clone(),
                    secs: self.deadline.as_secs(),
                };
                warn!(pr_id = %pr.pr_id, deadline_secs = self.deadline.as_secs(), "Review timed out");
                in_flight.settle(
                    ReviewState::Failed {
                        message: error.to_string(),
                    },
                    None,
                );
                return Err(error);
            }
            Ok(Err(e)) => {
                warn!(pr_id = %pr.pr_id, error = %e, "Review failed");
                (
                    ReviewState::Failed {
                        message: e.to_string(),
                    },
                    None,
                )
            }
            Ok(Ok(settled)) => settled,
        };

        in_flight.settle(state.clone(), selected);

        Ok(state)
    }

    async fn persist(
        &self,
        session: &Session,
        pr: &StartReviewRequest,
        content: String,
    ) -> (ReviewState, Option<SelectedReview>) {
        let record = NewReviewRecord::new(
            session.owner(),
            pr.pr_id.clone(),
            pr.title.clone(),
            pr.url.clone(),
            content.clone(),
        );

        match self.gateway.create(record).await.into_result() {
            Ok(record) => {
                info!(pr_id = %pr.pr_id, id = %record.id, "Review saved");
                (
                    ReviewState::Succeeded {
                        record: record.clone(),
                    },
                    Some(SelectedReview::Saved(record)),
                )
            }
            Err(error) => (
                ReviewState::PartiallySucceeded {
                    content: content.clone(),
                    error,
                },
                Some(SelectedReview::Unsaved {
                    pr_id: pr.pr_id.clone(),
                    content,
                }),
            ),
        }
    }
}
