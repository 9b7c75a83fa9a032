//! Recurrence sync
//!
//! [`RecurrenceEngine::sync`] reconciles a template with the occurrences it
//! owns in two phases:
//!
//! 1. **Delete**: owned occurrences off the template's slots (date outside
//!    the range, weekday not selected, or a time window that no longer
//!    matches) are removed.
//! 2. **Create/update**: every slot the template implies is upserted by
//!    (template, start, end). Existing occurrences get the template's
//!    mirrored fields; missing ones are created.
//!
//! With `protect_past_occurrences` set, occurrences that started before
//! "now" are neither deleted nor modified. Running sync again without
//! changing the template changes nothing.

use crate::dates::{day_count, in_week_of};
use crate::occurrence::Occurrence;
use crate::store::OccurrenceStore;
use crate::template::RecurrenceTemplate;
use chrono::{DateTime, Duration, Utc};
use portal_common::{Clock, Error, HookList, PortalEvent, Result};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Extra weeks scanned past the expected count so boundary weeks are not missed
const WEEK_BUFFER: u32 = 2;

/// Result of one sync pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Occurrences owned by the template after the sync, by start
    pub occurrences: Vec<Occurrence>,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Past occurrences left alone because the template protects them
    pub protected: usize,
    pub synced_at: DateTime<Utc>,
}

pub struct RecurrenceEngine {
    store: Arc<dyn OccurrenceStore>,
    clock: Arc<dyn Clock>,
    hooks: HookList,
}

impl RecurrenceEngine {
    pub fn new(store: Arc<dyn OccurrenceStore>, clock: Arc<dyn Clock>, hooks: HookList) -> Self {
        Self { store, clock, hooks }
    }

    pub fn store(&self) -> &Arc<dyn OccurrenceStore> {
        &self.store
    }

    pub fn expected_occurrence_count(&self, template: &RecurrenceTemplate) -> u32 {
        template.expected_occurrence_count()
    }

    fn is_protected(&self, template: &RecurrenceTemplate, occurrence: &Occurrence, now: DateTime<Utc>) -> bool {
        template.protect_past_occurrences && occurrence.start_at < now
    }

    /// Bring the template's occurrences in line with the template
    pub async fn sync(&self, template: &RecurrenceTemplate) -> Result<SyncOutcome> {
        let now = self.clock.now();
        let mut outcome = SyncOutcome {
            occurrences: Vec::new(),
            created: 0,
            updated: 0,
            deleted: 0,
            protected: 0,
            synced_at: now,
        };

        info!(
            template_id = %template.id,
            name = %template.name,
            expected = template.expected_occurrence_count(),
            "Syncing recurrence template"
        );

        // Delete phase runs first so a stale occurrence never blocks its replacement
        for occurrence in self.store.for_template(template.id).await? {
            if template.matches_slot(&occurrence) {
                continue;
            }
            if self.is_protected(template, &occurrence, now) {
                debug!(occurrence_id = %occurrence.id, start_at = %occurrence.start_at, "Keeping protected past occurrence");
                outcome.protected += 1;
                continue;
            }

            debug!(occurrence_id = %occurrence.id, start_at = %occurrence.start_at, "Deleting off-template occurrence");
            self.store.delete(occurrence.id).await?;
            outcome.deleted += 1;
            self.hooks.notify(&PortalEvent::OccurrenceDeleted {
                template_id: template.id,
                occurrence_id: occurrence.id,
            });
        }

        for day in &template.weekdays {
            let weeks = day_count(template.start_date, template.end_date, *day) + WEEK_BUFFER;
            let first = in_week_of(template.start_date, *day);

            for week in 0..weeks {
                let date = first + Duration::weeks(week as i64);
                if !template.contains_date(date) {
                    continue;
                }

                let (start_at, end_at) = template.occurrence_window(date);
                match self.store.find_slot(template.id, start_at, end_at).await? {
                    Some(existing) if self.is_protected(template, &existing, now) => {
                        debug!(occurrence_id = %existing.id, %start_at, "Skipping protected past occurrence");
                        outcome.protected += 1;
                    }
                    Some(existing) => {
                        if self.refresh(template, existing, now).await? {
                            outcome.updated += 1;
                        }
                    }
                    None => {
                        self.create(template, start_at, end_at, now).await?;
                        outcome.created += 1;
                    }
                }
            }
        }

        outcome.occurrences = self.store.for_template(template.id).await?;

        info!(
            template_id = %template.id,
            created = outcome.created,
            updated = outcome.updated,
            deleted = outcome.deleted,
            protected = outcome.protected,
            total = outcome.occurrences.len(),
            "Recurrence sync complete"
        );

        Ok(outcome)
    }

    /// First free name for a window: `name`, then `name 1`, `name 2`, ...
    async fn available_name(
        &self,
        name: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<String> {
        if !self.store.name_taken(name, start_at, end_at, exclude).await? {
            return Ok(name.to_string());
        }

        let mut n = 1u32;
        loop {
            let candidate = format!("{} {}", name, n);
            if !self.store.name_taken(&candidate, start_at, end_at, exclude).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    async fn create(
        &self,
        template: &RecurrenceTemplate,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let name = self.available_name(&template.name, start_at, end_at, None).await?;
        if name != template.name {
            debug!(name = %name, %start_at, "Slot name already in use, disambiguated");
        }

        let mut occurrence = Occurrence::new(name, start_at, end_at, now);
        template.mirror_onto(&mut occurrence);
        self.store.create(&occurrence).await?;

        debug!(occurrence_id = %occurrence.id, %start_at, "Created occurrence");
        self.hooks.notify(&PortalEvent::OccurrenceCreated {
            template_id: template.id,
            occurrence_id: occurrence.id,
            start_at,
        });
        Ok(())
    }

    /// Copy template fields onto an existing occurrence; true if it changed
    async fn refresh(&self, template: &RecurrenceTemplate, mut occurrence: Occurrence, now: DateTime<Utc>) -> Result<bool> {
        let name = self
            .available_name(&template.name, occurrence.start_at, occurrence.end_at, Some(occurrence.id))
            .await?;

        let mut changed = template.mirror_onto(&mut occurrence);
        if occurrence.name != name {
            occurrence.name = name;
            changed = true;
        }
        if !changed {
            return Ok(false);
        }

        occurrence.updated_at = now;
        self.store.update(&occurrence).await?;

        debug!(occurrence_id = %occurrence.id, start_at = %occurrence.start_at, "Updated occurrence");
        self.hooks.notify(&PortalEvent::OccurrenceUpdated {
            template_id: template.id,
            occurrence_id: occurrence.id,
        });
        Ok(true)
    }

    /// Cut an occurrence loose from its template
    ///
    /// Later syncs no longer see it; its slot is refilled by a new
    /// occurrence under a disambiguated name.
    pub async fn detach(&self, occurrence_id: Uuid) -> Result<Occurrence> {
        let mut occurrence = self
            .store
            .get(occurrence_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("occurrence {}", occurrence_id)))?;

        let Some(template_id) = occurrence.template_id else {
            return Ok(occurrence);
        };

        occurrence.detach();
        occurrence.updated_at = self.clock.now();
        self.store.update(&occurrence).await?;

        info!(%occurrence_id, %template_id, "Detached occurrence from template");
        self.hooks.notify(&PortalEvent::OccurrenceUpdated {
            template_id,
            occurrence_id,
        });
        Ok(occurrence)
    }
}
