use std::path::PathBuf;

use anyhow::bail;
use chrono::NaiveDate;
use clap::Parser;
use sca_core::{config::DefaultWindow, domain::TimeWindow};

/// Archive Slack channel history into monthly JSONL files.
#[derive(Debug, Parser)]
#[command(name = "sca", version)]
pub struct Args {
    /// First day to archive (YYYY-MM-DD, UTC, inclusive).
    pub from: Option<NaiveDate>,

    /// Last day to archive (YYYY-MM-DD, UTC, inclusive). Unbounded when omitted
    /// and FROM is given.
    pub to: Option<NaiveDate>,

    /// Settings file (JSON). Defaults to $SCA_CONFIG, then ./appsettings.json.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Explicit dates win; with none, fall back to the configured default window.
    pub fn window(&self, default: DefaultWindow, today: NaiveDate) -> anyhow::Result<TimeWindow> {
        match (self.from, self.to) {
            (None, None) => Ok(default.resolve(today)),
            (Some(from), Some(to)) if from > to => {
                bail!("from date {from} is after to date {to}")
            }
            (from, to) => Ok(TimeWindow::from_dates(from, to)),
        }
    }
}
