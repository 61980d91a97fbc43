//! Command handlers
//!
//! Implements the CLI subcommands over the service facade. Output goes to
//! stdout in either human-readable text or JSON, selected by the global
//! `--json` flag.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::agent::FinalReport;
use crate::service::CoachService;

/// How output is rendered to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Interval between polls while waiting for a finalization report
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle the `chat` command
pub async fn handle_chat(
    service: &CoachService,
    session: &str,
    message: &str,
    format: OutputFormat,
) -> Result<()> {
    let outcome = service.chat(session, message).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => {
            println!("{}", outcome.reply);
            for follow_up in &outcome.follow_ups {
                println!("  ? {}", follow_up);
            }
        }
    }

    Ok(())
}

/// Handle the `state` command
pub async fn handle_state(
    service: &CoachService,
    session: &str,
    format: OutputFormat,
) -> Result<()> {
    let state = service.get_state(session).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
        OutputFormat::Text => {
            println!(
                "Session with {} messages over {} user turns",
                state.messages.len(),
                state.user_turn_count
            );
            if !state.rolling_summary.is_empty() {
                println!("Summary: {}", state.rolling_summary);
            }
            if !state.deal_memory.is_empty() {
                println!(
                    "Deal facts: {}",
                    serde_json::to_string_pretty(&state.deal_memory)?
                );
            }
            match state.final_report {
                Some(_) => println!("Final report: ready"),
                None => println!("Final report: not yet generated"),
            }
        }
    }

    Ok(())
}

/// Handle the `reset` command
pub async fn handle_reset(service: &CoachService, session: &str) -> Result<()> {
    service.reset(session).await?;
    println!("Session {} reset.", session);
    Ok(())
}

/// Handle the `end-call` command
///
/// The pipeline runs on a background task inside this process, so the
/// handler polls for the report before exiting rather than leaving the run
/// to be killed with the process.
pub async fn handle_end_call(
    service: &CoachService,
    session: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let run_id = service.end_call(session).await?;
    println!("Finalization started (run {}).", run_id);

    report_or_still_processing(service, session, timeout, format).await
}

/// Handle the `result` command
pub async fn handle_report(
    service: &CoachService,
    session: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    report_or_still_processing(service, session, timeout, format).await
}

async fn report_or_still_processing(
    service: &CoachService,
    session: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    match poll_for_report(service, session, timeout).await? {
        Some(report) => print_report(&report, format),
        None => {
            println!("Still processing; run `dealcoach result --session {}` to retry.", session);
            Ok(())
        }
    }
}

/// Poll the session until its report is present or the timeout elapses
async fn poll_for_report(
    service: &CoachService,
    session: &str,
    timeout: Duration,
) -> Result<Option<FinalReport>> {
    let deadline = Instant::now() + timeout;

    loop {
        let state = service.get_state(session).await?;
        if let Some(report) = state.final_report {
            return Ok(Some(report));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_report(report: &FinalReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("Call summary:");
            for bullet in &report.summary_bullets {
                println!("  - {}", bullet);
            }
            println!("\nAction items:");
            for item in &report.action_items {
                println!("  [{:?}] {}", item.owner, item.item);
            }
            println!("\nFollow-up email draft:\n{}", report.followup_email);
        }
    }
    Ok(())
}
