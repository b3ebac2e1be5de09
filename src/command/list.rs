use anyhow::Result;
use console::style;
use tabled::{
    Table, Tabled,
    settings::{Padding, Style, object::Columns},
};

use crate::config::Config;
use crate::session::{Session, Status, now_secs};

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "AGE")]
    age: String,
    #[tabled(rename = "EXPIRES")]
    expires: String,
}

fn format_status(status: Status) -> String {
    let label = status.to_string();
    match status {
        Status::Running => style(label).green().to_string(),
        Status::Provisioning => style(label).yellow().to_string(),
        Status::Failed => style(label).red().to_string(),
        Status::Stopped => style(label).dim().to_string(),
    }
}

fn format_expiry(session: &Session, now: u64) -> String {
    match session.expires_at() {
        None => "-".to_string(),
        Some(_) if session.is_expired(now) => "expired".to_string(),
        Some(at) => format!("in {}", super::format_duration(at - now)),
    }
}

fn to_row(session: &Session, now: u64) -> SessionRow {
    SessionRow {
        id: session.id.clone(),
        status: format_status(session.status),
        provider: session.provider_name().unwrap_or("(legacy)").to_string(),
        address: session.address().unwrap_or("-").to_string(),
        age: super::format_duration(now.saturating_sub(session.created_at())),
        expires: format_expiry(session, now),
    }
}

pub fn run(all: bool) -> Result<()> {
    let config = Config::load()?;
    let store = super::open_store(&config);
    let sessions = if all {
        store.list()?
    } else {
        store.list_active()?
    };

    if sessions.is_empty() {
        if all {
            println!("No sessions found");
        } else {
            println!("No active sessions (use --all to include stopped and failed)");
        }
        return Ok(());
    }

    let now = now_secs();
    let rows: Vec<SessionRow> = sessions.iter().map(|s| to_row(s, now)).collect();

    let mut table = Table::new(rows);
    table
        .with(Style::blank())
        .modify(Columns::new(0..6), Padding::new(0, 1, 0, 0));

    println!("{table}");
    Ok(())
}
