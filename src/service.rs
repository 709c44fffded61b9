use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::error::BambooError;
use crate::helpers::dates;
use crate::helpers::request::ApiRequest;
use crate::helpers::session::SessionManager;
use crate::models::bamboo::{
    CatalogEntry, DeleteEntriesPayload, HourEntry, SubmitHoursPayload, TimesheetDay,
    TimesheetResponse,
};

const ENTRIES_ENDPOINT: &str = "timesheet/hour/entries";

/// Values the presentation layer supplies to the core.
#[derive(Clone, Debug)]
pub struct TimesheetConfig {
    pub organization: String,
    pub include_weekends: bool,
    pub default_hours: f64,
}

/// The main timesheet service: batched create/delete of hour entries and
/// timesheet fetches, on top of a session that is re-established whenever it
/// lapses. One logical session per service; callers serialize access.
pub struct TimesheetService {
    pub session: SessionManager,
    pub config: TimesheetConfig,
}

impl TimesheetService {
    /// Create a new timesheet service instance.
    pub fn new(session: SessionManager, config: TimesheetConfig) -> Self {
        info!("Creating timesheet service for {}", config.organization);
        Self { session, config }
    }

    /// The flattened project/task catalog of the current session.
    pub async fn catalog(&mut self) -> Result<&BTreeMap<String, CatalogEntry>, BambooError> {
        let context = self.session.ensure_session().await?;
        Ok(&context.catalog)
    }

    /// Create one entry per day in a single batch POST. The batch either
    /// lands as a whole or not at all; nothing is retried per entry.
    pub async fn submit(
        &mut self,
        task: &CatalogEntry,
        days: &[NaiveDate],
        hours: f64,
        note: &str,
    ) -> Result<(), BambooError> {
        if days.is_empty() {
            info!("No days to submit for {}, skipping", task);
            return Ok(());
        }

        let employee_id = self.session.ensure_session().await?.user.employee_id;
        let entries = build_hour_entries(task, days, hours, note, employee_id);
        info!(
            "Submitting {} entr(ies) of {}h for {} ({} to {})",
            entries.len(),
            hours,
            task,
            days[0],
            days[days.len() - 1]
        );

        let payload = serde_json::to_value(SubmitHoursPayload { hours: entries })?;
        self.session
            .execute(ApiRequest::post(ENTRIES_ENDPOINT).json(payload).accept_json())
            .await?
            .error_for_status(ENTRIES_ENDPOINT)?;
        Ok(())
    }

    /// Expand `start..=end` through the date range resolver (honoring the
    /// configured weekend flag) and submit the result as one batch.
    pub async fn submit_range(
        &mut self,
        task: &CatalogEntry,
        start: NaiveDate,
        end: NaiveDate,
        hours: f64,
        note: &str,
    ) -> Result<(), BambooError> {
        let days = dates::expand(start, end, self.config.include_weekends);
        self.submit(task, &days, hours, note).await
    }

    /// Delete existing entries in a single batch DELETE; all-or-nothing.
    pub async fn delete(&mut self, ids: &[i64]) -> Result<(), BambooError> {
        if ids.is_empty() {
            return Ok(());
        }

        self.session.ensure_session().await?;
        info!("Deleting {} entr(ies)", ids.len());
        let payload = serde_json::to_value(DeleteEntriesPayload { entries: ids.to_vec() })?;
        self.session
            .execute(ApiRequest::delete(ENTRIES_ENDPOINT).json(payload).accept_json())
            .await?
            .error_for_status(ENTRIES_ENDPOINT)?;
        Ok(())
    }

    /// Fetch the timesheet keyed by the session's timesheet id, as a mapping
    /// from date to that day's record. Plain JSON, no scraping involved.
    pub async fn fetch_timesheet(
        &mut self,
    ) -> Result<BTreeMap<NaiveDate, TimesheetDay>, BambooError> {
        let timesheet_id = self.session.ensure_session().await?.meta.timesheet_id;
        let endpoint = format!("timesheet/{timesheet_id}");

        let response = self
            .session
            .execute(ApiRequest::get(&endpoint).accept_json())
            .await?
            .error_for_status(&endpoint)?;
        let decoded: TimesheetResponse = response.json().inspect_err(|e| {
            error!("Timesheet {} body did not decode: {}", timesheet_id, e);
        })?;
        info!(
            "Fetched timesheet {} with {} day(s)",
            timesheet_id,
            decoded.daily_details.len()
        );
        Ok(decoded.daily_details)
    }
}

/// One [`HourEntry`] per day, in day order. `daily_entry_id` numbers the
/// batch 1-based so the platform can tell same-day entries apart. A task
/// with a parent project submits `taskId` + `projectId`; a project standing
/// for itself submits only `projectId`.
pub fn build_hour_entries(
    task: &CatalogEntry,
    days: &[NaiveDate],
    hours: f64,
    note: &str,
    employee_id: i64,
) -> Vec<HourEntry> {
    let (task_id, project_id) = match &task.parent {
        Some(parent) => (Some(task.id), parent.id),
        None => (None, task.id),
    };

    days.iter()
        .enumerate()
        .map(|(index, day)| HourEntry {
            id: None,
            employee_id,
            date: *day,
            hours,
            note: note.to_string(),
            task_id,
            project_id,
            daily_entry_id: index as i64 + 1,
        })
        .collect()
}
