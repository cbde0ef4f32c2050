//! Meal draft and the prediction submission state machine.
//!
//! A submission is split in three steps so that several may be in flight
//! without holding a borrow of the orchestrator across the network call:
//!
//! 1. [`PredictionOrchestrator::begin_submit`] validates the draft and hands
//!    out a numbered [`Submission`];
//! 2. [`Submission::run`] fetches a credential and calls the API;
//! 3. [`PredictionOrchestrator::finish`] applies the outcome, unless a newer
//!    submission has been started since, in which case it is dropped.
//!
//! [`PredictionOrchestrator::submit`] chains the three for the common case.

use crate::auth::TokenSource;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::models::{Dosha, Exercise, MealItem, PredictionData, PredictionRequest};

/// Where the current submission stands. Exactly one of "loading", "result"
/// and "error" can hold at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SubmissionState {
    #[default]
    Idle,
    /// Transient: the draft is being checked.
    Validating,
    Submitting,
    Success(PredictionData),
    Failed(ApiError),
}

/// A validated request waiting to be sent, tagged with its sequence number.
#[derive(Debug, Clone)]
pub struct Submission {
    seq: u64,
    request: PredictionRequest,
}

/// Result of running a [`Submission`], to be handed back to
/// [`PredictionOrchestrator::finish`].
#[derive(Debug)]
pub struct Completion {
    seq: u64,
    outcome: Result<PredictionData, ApiError>,
}

impl Submission {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn request(&self) -> &PredictionRequest {
        &self.request
    }

    /// Fetch a fresh credential and send the request. Never fails: the
    /// outcome travels inside the [`Completion`].
    pub async fn run<T>(self, tokens: &T, client: &ApiClient) -> Completion
    where
        T: TokenSource + ?Sized,
    {
        let outcome = match tokens.access_token().await {
            Ok(credential) => client.generate_prediction(&credential, &self.request).await,
            Err(e) => Err(ApiError::Auth(e.to_string())),
        };
        Completion {
            seq: self.seq,
            outcome,
        }
    }
}

/// Owns the user's meal/exercise/lifestyle draft and the state of the last
/// prediction request.
#[derive(Debug)]
pub struct PredictionOrchestrator {
    meal_items: Vec<MealItem>,
    next_item_id: u64,
    exercise: Exercise,
    lifestyle_factors: String,
    dosha: Dosha,
    state: SubmissionState,
    latest_seq: u64,
}

impl Default for PredictionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionOrchestrator {
    /// Fresh session: one empty meal line, default dosha.
    pub fn new() -> Self {
        let mut orchestrator = Self {
            meal_items: Vec::new(),
            next_item_id: 1,
            exercise: Exercise::default(),
            lifestyle_factors: String::new(),
            dosha: Dosha::default(),
            state: SubmissionState::Idle,
            latest_seq: 0,
        };
        orchestrator.add_meal_item("");
        orchestrator
    }

    pub fn meal_items(&self) -> &[MealItem] {
        &self.meal_items
    }

    /// Append a meal line and return its id.
    pub fn add_meal_item(&mut self, value: impl Into<String>) -> u64 {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.meal_items.push(MealItem::new(id, value));
        id
    }

    /// Returns false if no line has this id.
    pub fn update_meal_item(&mut self, id: u64, value: impl Into<String>) -> bool {
        match self.meal_items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.value = value.into();
                true
            }
            None => false,
        }
    }

    pub fn remove_meal_item(&mut self, id: u64) -> bool {
        let before = self.meal_items.len();
        self.meal_items.retain(|item| item.id != id);
        self.meal_items.len() != before
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn set_exercise(&mut self, exercise: Exercise) {
        self.exercise = exercise;
    }

    pub fn lifestyle_factors(&self) -> &str {
        &self.lifestyle_factors
    }

    pub fn set_lifestyle_factors(&mut self, text: impl Into<String>) {
        self.lifestyle_factors = text.into();
    }

    pub fn dosha(&self) -> Dosha {
        self.dosha
    }

    pub fn set_dosha(&mut self, dosha: Dosha) {
        self.dosha = dosha;
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, SubmissionState::Submitting)
    }

    pub fn result(&self) -> Option<&PredictionData> {
        match self.state {
            SubmissionState::Success(ref data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self.state {
            SubmissionState::Failed(ref err) => Some(err),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error().map(ApiError::display_message)
    }

    /// Whether a submit button should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.is_loading() && self.meal_items.iter().any(|item| !item.is_blank())
    }

    /// Validate the draft and start a new submission.
    ///
    /// Any submission already in flight is superseded, including when
    /// validation fails. On failure the state is `Failed` and no request
    /// should be sent; the error is also returned.
    pub fn begin_submit(&mut self) -> Result<Submission, ApiError> {
        self.latest_seq += 1;
        let seq = self.latest_seq;
        self.state = SubmissionState::Validating;

        let request = match PredictionRequest::new(
            &self.meal_items,
            self.exercise.clone(),
            self.lifestyle_factors.clone(),
            self.dosha,
        ) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!("Submission {} rejected: {}", seq, err);
                self.state = SubmissionState::Failed(err.clone());
                return Err(err);
            }
        };

        tracing::debug!(
            "Submission {} started with {} meal item(s)",
            seq,
            request.meal_items().len()
        );
        self.state = SubmissionState::Submitting;
        Ok(Submission { seq, request })
    }

    /// Apply a finished submission. Returns false when it was stale and got
    /// discarded.
    pub fn finish(&mut self, completion: Completion) -> bool {
        if completion.seq != self.latest_seq {
            tracing::debug!(
                "Discarding stale submission {} (latest is {})",
                completion.seq,
                self.latest_seq
            );
            return false;
        }

        self.state = match completion.outcome {
            Ok(data) => {
                tracing::info!("Prediction {} received", completion.seq);
                SubmissionState::Success(data)
            }
            Err(err) => {
                tracing::warn!("Prediction {} failed: {}", completion.seq, err);
                SubmissionState::Failed(err)
            }
        };
        true
    }

    /// Validate, send and record the outcome in one go.
    pub async fn submit<T>(&mut self, tokens: &T, client: &ApiClient) -> &SubmissionState
    where
        T: TokenSource + ?Sized,
    {
        if let Ok(submission) = self.begin_submit() {
            let completion = submission.run(tokens, client).await;
            self.finish(completion);
        }
        &self.state
    }
}
