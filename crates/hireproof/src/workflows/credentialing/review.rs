use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::ReviewFlag;

/// Ticket handle returned by the human review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResolution {
    Pending,
    Approved,
    Overridden,
}

/// Outbound sink for review-worthy events. The pipeline writes flags here and
/// polls for resolution; the review UI itself lives elsewhere.
pub trait ReviewSink: Send + Sync {
    fn enqueue(&self, flag: &ReviewFlag) -> Result<ReviewId, ReviewError>;
    fn resolution(&self, id: &ReviewId) -> Result<ReviewResolution, ReviewError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("unknown review ticket")]
    UnknownTicket,
    #[error("review queue unavailable: {0}")]
    Unavailable(String),
}

/// In-memory queue for tests, the demo, and the dev server. Resolutions are
/// applied through [`InMemoryReviewSink::resolve`], standing in for the
/// reviewer UI.
#[derive(Default, Clone)]
pub struct InMemoryReviewSink {
    tickets: Arc<Mutex<HashMap<ReviewId, (ReviewFlag, ReviewResolution)>>>,
}

impl InMemoryReviewSink {
    pub fn resolve(&self, id: &ReviewId, resolution: ReviewResolution) -> Result<(), ReviewError> {
        let mut guard = self.tickets.lock().expect("review mutex poisoned");
        let entry = guard.get_mut(id).ok_or(ReviewError::UnknownTicket)?;
        entry.1 = resolution;
        Ok(())
    }

    pub fn pending(&self) -> Vec<(ReviewId, ReviewFlag)> {
        let guard = self.tickets.lock().expect("review mutex poisoned");
        guard
            .iter()
            .filter(|(_, (_, resolution))| *resolution == ReviewResolution::Pending)
            .map(|(id, (flag, _))| (*id, flag.clone()))
            .collect()
    }
}

impl ReviewSink for InMemoryReviewSink {
    fn enqueue(&self, flag: &ReviewFlag) -> Result<ReviewId, ReviewError> {
        let id = ReviewId(Uuid::new_v4());
        let mut guard = self.tickets.lock().expect("review mutex poisoned");
        guard.insert(id, (flag.clone(), ReviewResolution::Pending));
        Ok(id)
    }

    fn resolution(&self, id: &ReviewId) -> Result<ReviewResolution, ReviewError> {
        let guard = self.tickets.lock().expect("review mutex poisoned");
        guard
            .get(id)
            .map(|(_, resolution)| *resolution)
            .ok_or(ReviewError::UnknownTicket)
    }
}
