use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logged-in profile, scraped from the `SESSION_USER=` blob on the home page.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionUser {
    #[serde(rename = "employeeId")]
    pub employee_id: i64,
    pub name: String,
}

/// Org-wide time-tracking configuration, scraped from the
/// `window.time_tracking = ` blob on the home page.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimeTrackingMeta {
    #[serde(rename = "timesheetId")]
    pub timesheet_id: i64,
    #[serde(rename = "projectsWithTasks", default)]
    pub projects_with_tasks: Vec<Project>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub name: String,
}

/// One selectable unit of the flattened catalog: either a top-level project
/// acting as its own task, or a task carrying a reference to its project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub parent: Option<ProjectRef>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: i64,
    pub name: String,
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} / {}", parent.name, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Body of `auth/check_session`.
#[derive(Serialize, Deserialize, Debug)]
pub struct CheckSessionResponse {
    #[serde(rename = "SessionMinutesLeft")]
    pub session_minutes_left: i64,
    #[serde(rename = "CSRFToken")]
    pub csrf_token: String,
}

/// One time entry as submitted to (or deleted from) the entries endpoint.
///
/// `id` is null for entries being created; `daily_entry_id` is the 1-based
/// position within one submit batch, which is how the platform tells apart
/// several same-day entries sent together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourEntry {
    pub id: Option<i64>,
    pub employee_id: i64,
    pub date: NaiveDate,
    pub hours: f64,
    pub note: String,
    pub task_id: Option<i64>,
    pub project_id: i64,
    pub daily_entry_id: i64,
}

/// POST body of the batch create call.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitHoursPayload {
    pub hours: Vec<HourEntry>,
}

/// DELETE body of the batch delete call.
#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteEntriesPayload {
    pub entries: Vec<i64>,
}

/// Response shape of `timesheet/<id>`.
#[derive(Serialize, Deserialize, Debug)]
pub struct TimesheetResponse {
    #[serde(rename = "dailyDetails", default)]
    pub daily_details: BTreeMap<NaiveDate, TimesheetDay>,
}

/// One calendar day's record as returned by the timesheet endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetDay {
    pub date: NaiveDate,
    #[serde(default)]
    pub total_hours: f64,
    #[serde(default)]
    pub hour_entries: Vec<TimesheetEntry>,
}

/// An existing entry on a fetched timesheet. The fetch shape carries display
/// names where the submit shape carries ids.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntry {
    pub id: i64,
    pub hours: f64,
    pub project_name: Option<String>,
    pub task_name: Option<String>,
    pub note: Option<String>,
}
