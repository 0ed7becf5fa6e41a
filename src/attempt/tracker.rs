// src/attempt/tracker.rs

use std::collections::{HashMap, HashSet};

use crate::error::AppError;

/// Answered versus total questions, recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn unanswered(&self) -> usize {
        self.total - self.answered
    }

    /// Share of answered questions in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.answered as f64 / self.total as f64
        }
    }
}

/// Selected option and review star per question.
///
/// Only question ids known at construction are accepted, so the answer map's
/// keys are always a subset of the fetched questions.
#[derive(Debug, Clone, Default)]
pub struct AnswerTracker {
    question_ids: Vec<i64>,
    known: HashSet<i64>,
    answers: HashMap<i64, i64>,
    starred: HashSet<i64>,
}

impl AnswerTracker {
    pub fn new(question_ids: impl IntoIterator<Item = i64>) -> Self {
        let question_ids: Vec<i64> = question_ids.into_iter().collect();
        let known = question_ids.iter().copied().collect();
        Self {
            question_ids,
            known,
            ..Self::default()
        }
    }

    fn ensure_known(&self, question_id: i64) -> Result<(), AppError> {
        if self.known.contains(&question_id) {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!(
                "Question {} is not part of this quiz",
                question_id
            )))
        }
    }

    /// Replaces any prior selection. Returns the replaced option id.
    /// The option is not checked against the question; scoring is server-side.
    pub fn set_answer(&mut self, question_id: i64, option_id: i64) -> Result<Option<i64>, AppError> {
        self.ensure_known(question_id)?;
        Ok(self.answers.insert(question_id, option_id))
    }

    pub fn answer(&self, question_id: i64) -> Option<i64> {
        self.answers.get(&question_id).copied()
    }

    /// Flips the review star. Returns the new state.
    pub fn toggle_star(&mut self, question_id: i64) -> Result<bool, AppError> {
        self.ensure_known(question_id)?;
        if self.starred.remove(&question_id) {
            Ok(false)
        } else {
            self.starred.insert(question_id);
            Ok(true)
        }
    }

    pub fn is_starred(&self, question_id: i64) -> bool {
        self.starred.contains(&question_id)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            answered: self.answers.len(),
            total: self.question_ids.len(),
        }
    }

    pub fn unanswered(&self) -> usize {
        self.progress().unanswered()
    }

    /// `(question id, option id)` pairs in question order.
    pub fn answered_in_order(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.question_ids
            .iter()
            .filter_map(|q| self.answers.get(q).map(|o| (*q, *o)))
    }
}
