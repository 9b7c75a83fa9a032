//! Weekly recurrence templates
//!
//! A template names the weekdays an event repeats on, the inclusive date
//! range it runs over and the time-of-day window of each occurrence. Times
//! are UTC. An end time earlier than the start time makes every occurrence
//! run past midnight into the next day.
//!
//! Templates are validated when built or loaded, never during a sync.

use crate::dates::{day_count, DayType};
use crate::error::TemplateError;
use crate::occurrence::{EventType, Occurrence};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

fn default_start_time() -> NaiveTime {
    NaiveTime::MIN
}

fn default_end_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceTemplate {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub weekdays: BTreeSet<DayType>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_start_time")]
    pub start_time: NaiveTime,
    #[serde(default = "default_end_time")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub primary_host: Option<String>,
    #[serde(default)]
    pub secondary_hosts: Vec<String>,
    /// Leave occurrences that already started untouched during sync
    #[serde(default)]
    pub protect_past_occurrences: bool,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
}

impl RecurrenceTemplate {
    /// All-day template over `[start_date, end_date]`
    pub fn new(
        name: impl Into<String>,
        weekdays: impl IntoIterator<Item = DayType>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, TemplateError> {
        let template = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            location: None,
            weekdays: weekdays.into_iter().collect(),
            start_date,
            end_date,
            start_time: default_start_time(),
            end_time: default_end_time(),
            primary_host: None,
            secondary_hosts: Vec::new(),
            protect_past_occurrences: false,
            event_type: EventType::default(),
            is_public: true,
            attachments: Vec::new(),
            last_synced: None,
        };
        template.validate()?;
        Ok(template)
    }

    pub fn with_times(mut self, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_hosts(mut self, primary: impl Into<String>, secondary: Vec<String>) -> Self {
        self.primary_host = Some(primary.into());
        self.secondary_hosts = secondary;
        self
    }

    pub fn protect_past(mut self, protect: bool) -> Self {
        self.protect_past_occurrences = protect;
        self
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.weekdays.is_empty() {
            return Err(TemplateError::NoWeekdays);
        }
        if self.start_date > self.end_date {
            return Err(TemplateError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML template
    pub fn from_toml(text: &str) -> Result<Self, TemplateError> {
        let template: Self = toml::from_str(text)?;
        template.validate()?;
        Ok(template)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn is_all_day(&self) -> bool {
        self.start_time == default_start_time() && self.end_time == default_end_time()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn expected_occurrence_count(&self) -> u32 {
        self.weekdays
            .iter()
            .map(|day| day_count(self.start_date, self.end_date, *day))
            .sum()
    }

    /// Start and end instants of the occurrence on `date`
    pub fn occurrence_window(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start_at = date.and_time(self.start_time).and_utc();
        let mut end_at = date.and_time(self.end_time).and_utc();
        if self.end_time < self.start_time {
            end_at += Duration::days(1);
        }
        (start_at, end_at)
    }

    /// Whether `occurrence` sits on one of this template's slots
    pub fn matches_slot(&self, occurrence: &Occurrence) -> bool {
        let date = occurrence.start_at.date_naive();
        self.contains_date(date)
            && self.weekdays.contains(&DayType::of(date))
            && self.occurrence_window(date) == (occurrence.start_at, occurrence.end_at)
    }

    /// Copy the template's mirrored fields onto an occurrence
    ///
    /// Returns whether anything changed. The name is handled by the sync
    /// pass because it may need disambiguating.
    pub fn mirror_onto(&self, occurrence: &mut Occurrence) -> bool {
        let before = occurrence.clone();

        occurrence.template_id = Some(self.id);
        occurrence.location = self.location.clone();
        occurrence.description = self.description.clone();
        occurrence.event_type = self.event_type;
        occurrence.is_public = self.is_public;
        occurrence.primary_host = self.primary_host.clone();
        occurrence.secondary_hosts = self.secondary_hosts.clone();
        occurrence.attachments = self.attachments.clone();

        *occurrence != before
    }

    /// Weekly iCalendar recurrence rule, e.g.
    /// `FREQ=WEEKLY;INTERVAL=1;BYDAY=TU,TH;UNTIL=20241201T235959Z`
    pub fn rrule(&self) -> String {
        let days: Vec<&str> = self.weekdays.iter().map(|d| d.ical_code()).collect();
        format!(
            "FREQ=WEEKLY;INTERVAL=1;BYDAY={};UNTIL={}T235959Z",
            days.join(","),
            self.end_date.format("%Y%m%d")
        )
    }
}
