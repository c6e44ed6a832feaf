mod cli;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use sca_core::{archiver::Archiver, config::Config, writer::ArchiveWriter};
use sca_slack::SlackClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    sca_core::logging::init("sca")?;

    let cfg = Config::load(args.config.as_deref()).context("loading configuration")?;
    let window = args.window(cfg.default_window, Utc::now().date_naive())?;
    tracing::info!(
        from = ?window.from,
        to = ?window.to,
        channels = cfg.channels.len(),
        output = %cfg.output_path.display(),
        "starting slack channel archive"
    );

    let cancel = CancellationToken::new();
    if let Some(limit) = cfg.run_timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tracing::warn!(timeout_s = limit.as_secs(), "run deadline reached; cancelling");
            cancel.cancel();
        });
    }

    let api = Arc::new(SlackClient::from_config(&cfg, cancel.clone())?);
    let archiver = Archiver::new(
        api,
        ArchiveWriter::new(&cfg.output_path),
        cfg.channels.clone(),
        cfg.max_concurrent_channels,
    );

    let report = archiver.archive_all(window).await;
    for outcome in report.outcomes.iter().filter(|o| o.result.is_err()) {
        if let Err(e) = &outcome.result {
            tracing::error!(channel = %outcome.channel.name, error = %e, "channel failed");
        }
    }
    report.into_result()?;

    tracing::info!("archive process completed successfully");
    Ok(())
}
