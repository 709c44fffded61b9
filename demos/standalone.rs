use chrono::NaiveDate;
use std::env;
use std::sync::Arc;
use tracing::info;

use bamboohr_timesheet_util::{
    Credential, CredentialProvider, SessionManager, TimesheetConfig, TimesheetService,
};

/// Credentials from the environment; a real frontend would plug in the
/// platform keychain or an auth-source lookup here.
struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn lookup(&self, _host: &str) -> Option<Credential> {
        let username = env::var("BAMBOO_USERNAME").ok()?;
        let secret = env::var("BAMBOO_PASSWORD").ok()?;
        Some(Credential { username, secret })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let organization = env::var("BAMBOO_ORG").unwrap_or_else(|_| "acme".to_string());
    info!("Starting timesheet demo for organization {}", organization);

    let config = TimesheetConfig {
        organization: organization.clone(),
        include_weekends: false,
        default_hours: 8.0,
    };

    let session = SessionManager::new(&organization, Arc::new(EnvCredentials))?;
    let mut service = TimesheetService::new(session, config);

    // Show what can be booked against.
    let catalog: Vec<String> = service.catalog().await?.values().map(ToString::to_string).collect();
    for entry in &catalog {
        println!("selectable: {entry}");
    }

    // Print the current timesheet.
    for (date, day) in service.fetch_timesheet().await? {
        println!("{date}: {:.2}h over {} entries", day.total_hours, day.hour_entries.len());
    }

    // Book a week of work against the first selectable unit, if any.
    if let (Ok(start), Ok(end)) = (
        env::var("BAMBOO_START").map(|s| s.parse::<NaiveDate>()),
        env::var("BAMBOO_END").map(|s| s.parse::<NaiveDate>()),
    ) {
        let (start, end) = (start?, end?);
        let task = {
            let catalog = service.catalog().await?;
            catalog.values().next().cloned()
        };
        if let Some(task) = task {
            let hours = service.config.default_hours;
            service.submit_range(&task, start, end, hours, "booked via demo").await?;
            println!("submitted {start} to {end} against {task}");
        }
    }

    Ok(())
}
