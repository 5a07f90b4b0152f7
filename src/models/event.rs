use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::posture::{BadPosture, PostureClassification, StatusTag};
use super::session::SessionId;

/// One observed posture status, as handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureEvent {
    pub id: Uuid,
    pub session_id: SessionId,
    pub status: StatusTag,
    pub reason: Option<BadPosture>,
    pub recorded_at: DateTime<Utc>,
}

impl PostureEvent {
    pub fn new(
        session_id: SessionId,
        classification: &PostureClassification,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            status: classification.tag(),
            reason: classification.bad_posture(),
            recorded_at,
        }
    }
}

/// Feedback tier derived from the share of good-posture observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTier {
    Excellent,
    Good,
    NeedsImprovement,
}

impl FeedbackTier {
    pub fn from_percentage(good_percentage: f64) -> Self {
        if good_percentage >= 80.0 {
            Self::Excellent
        } else if good_percentage >= 50.0 {
            Self::Good
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent work! Your posture score is fantastic!",
            Self::Good => "Good session! Keep trying to maintain your posture next time!",
            Self::NeedsImprovement => {
                "Needs improvement. Let's focus on posture awareness next session."
            }
        }
    }
}

/// Aggregate of the events recorded for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    /// Observations with a GOOD or BAD verdict
    pub assessed_events: u64,
    pub good_events: u64,
    pub bad_events: u64,
    /// Observations that were calibrating or unknown
    pub other_events: u64,
    pub good_percentage: f64,
    pub bad_reasons: BTreeMap<BadPosture, u64>,
    pub feedback: FeedbackTier,
    pub feedback_message: String,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn from_events<'a>(
        session_id: SessionId,
        events: impl IntoIterator<Item = &'a PostureEvent>,
    ) -> Self {
        let mut good_events = 0u64;
        let mut bad_events = 0u64;
        let mut other_events = 0u64;
        let mut bad_reasons = BTreeMap::new();
        let mut first_event_at: Option<DateTime<Utc>> = None;
        let mut last_event_at: Option<DateTime<Utc>> = None;

        for event in events {
            match event.status {
                StatusTag::Good => good_events += 1,
                StatusTag::Bad => {
                    bad_events += 1;
                    if let Some(reason) = event.reason {
                        *bad_reasons.entry(reason).or_insert(0) += 1;
                    }
                }
                _ => other_events += 1,
            }

            first_event_at = Some(first_event_at.map_or(event.recorded_at, |t| t.min(event.recorded_at)));
            last_event_at = Some(last_event_at.map_or(event.recorded_at, |t| t.max(event.recorded_at)));
        }

        let assessed_events = good_events + bad_events;
        let good_percentage = if assessed_events > 0 {
            ((good_events as f64 / assessed_events as f64) * 1000.0).round() / 10.0
        } else {
            0.0
        };
        let feedback = FeedbackTier::from_percentage(good_percentage);

        Self {
            session_id,
            assessed_events,
            good_events,
            bad_events,
            other_events,
            good_percentage,
            bad_reasons,
            feedback,
            feedback_message: feedback.message().to_string(),
            first_event_at,
            last_event_at,
        }
    }
}
