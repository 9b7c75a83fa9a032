//! Dated occurrences
//!
//! An occurrence is one concrete instance of an event. Occurrences produced
//! by a sync keep a reference to their template; detaching one clears that
//! reference and leaves it alone on every later sync.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Broad kind of event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Gbm,
    Workshop,
    Social,
    InternalMeeting,
    Speaker,
    #[default]
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Gbm => "gbm",
            EventType::Workshop => "workshop",
            EventType::Social => "social",
            EventType::InternalMeeting => "internal_meeting",
            EventType::Speaker => "speaker",
            EventType::Other => "other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gbm" => Ok(EventType::Gbm),
            "workshop" => Ok(EventType::Workshop),
            "social" => Ok(EventType::Social),
            "internal_meeting" => Ok(EventType::InternalMeeting),
            "speaker" => Ok(EventType::Speaker),
            "other" => Ok(EventType::Other),
            _ => Err(format!("unknown event type '{}'", s)),
        }
    }
}

/// Where an occurrence stands relative to a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Scheduled,
    InProgress,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: Uuid,
    /// Owning template, `None` once detached
    pub template_id: Option<Uuid>,
    pub name: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub event_type: EventType,
    pub is_public: bool,
    pub primary_host: Option<String>,
    pub secondary_hosts: Vec<String>,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn new(name: impl Into<String>, start_at: DateTime<Utc>, end_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id: None,
            name: name.into(),
            start_at,
            end_at,
            location: None,
            description: None,
            event_type: EventType::default(),
            is_public: true,
            primary_host: None,
            secondary_hosts: Vec::new(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> OccurrenceStatus {
        if now < self.start_at {
            OccurrenceStatus::Scheduled
        } else if now < self.end_at {
            OccurrenceStatus::InProgress
        } else {
            OccurrenceStatus::Ended
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }

    pub fn is_detached(&self) -> bool {
        self.template_id.is_none()
    }

    /// Break the link to the owning template
    pub fn detach(&mut self) {
        self.template_id = None;
    }
}
