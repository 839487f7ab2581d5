use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::ArgMatches;
use serde::Serialize;
use tracing::{error, info, warn};

use explainer_config::ExplainerConfig;
use explainer_core::{
    AdapterConfig, AjaxStatusFetcher, ConnectOptions, ConnectionStatus, ErrorReport,
    JobConnectionAdapter, JobState, JobStatus, JobUpdate, ManagerConfig, PageLifecycle,
    PanelOptions, PollingManager, StatusFetcher, SubscriptionHandle, TrackedJobs,
};

const PROGRESS_PANEL: &str = "watch-progress";

/// Values given on the command line that win over every config layer.
#[derive(Debug, Default, Clone, PartialEq)]
struct WatchOverrides {
    url: Option<String>,
    nonce: Option<String>,
    interval_ms: Option<u64>,
    max_retries: Option<u32>,
}

impl WatchOverrides {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            url: matches.get_one::<String>("url").cloned(),
            nonce: matches.get_one::<String>("nonce").cloned(),
            interval_ms: matches.get_one::<u64>("interval-ms").copied(),
            max_retries: matches.get_one::<u32>("max-retries").copied(),
        }
    }

    fn apply(&self, config: &mut ExplainerConfig) {
        if let Some(url) = &self.url {
            config.ajax.base_url = Some(url.clone());
        }
        if let Some(nonce) = &self.nonce {
            config.ajax.nonce = Some(nonce.clone());
        }
        if let Some(interval_ms) = self.interval_ms {
            config.polling.poll_interval_ms = Some(interval_ms);
            // A slow explicit interval raises the ceiling instead of failing validation.
            let ceiling = config.polling.poll_backoff_max().as_millis() as u64;
            if interval_ms > ceiling {
                config.polling.poll_backoff_max_ms = Some(interval_ms);
            }
        }
        if let Some(max_retries) = self.max_retries {
            config.polling.max_retries = Some(max_retries);
        }
    }
}

/// How one watched job ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct JobOutcome {
    id: String,
    connection: ConnectionStatus,
    job_status: Option<JobStatus>,
}

impl JobOutcome {
    fn succeeded(&self) -> bool {
        self.job_status == Some(JobStatus::Completed)
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputLine<'a> {
    Update {
        id: &'a str,
        #[serde(flatten)]
        update: &'a JobUpdate,
    },
    Error {
        #[serde(flatten)]
        report: &'a ErrorReport,
    },
    Summary {
        interrupted: bool,
        jobs: &'a [JobOutcome],
    },
}

fn print_json(line: &OutputLine<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(event = "cli.watch.serialize_failed", error = %e),
    }
}

pub(crate) fn handle_watch_command(
    matches: &ArgMatches,
    mut config: ExplainerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_ids = unique_job_ids(
        matches
            .get_many::<String>("job_ids")
            .ok_or("No job ids provided")?,
    );
    let json_output = matches.get_flag("json");

    WatchOverrides::from_matches(matches).apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        error!(event = "cli.watch_failed", error = %e);
        return Err(e.into());
    }

    info!(
        event = "cli.watch_started",
        jobs = job_ids.len(),
        url = config.ajax.base_url(),
        json_output = json_output,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let (outcomes, interrupted) =
        match runtime.block_on(watch_jobs(&config, &job_ids, json_output)) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Could not start watching: {}", e);
                error!(event = "cli.watch_failed", error = %e);
                return Err(e);
            }
        };

    if json_output {
        print_json(&OutputLine::Summary {
            interrupted,
            jobs: &outcomes,
        });
    } else {
        print_summary(&outcomes, interrupted);
    }

    let unfinished = outcomes.iter().filter(|o| !o.succeeded()).count();
    if unfinished == 0 {
        info!(event = "cli.watch_completed", jobs = outcomes.len());
        Ok(())
    } else {
        error!(
            event = "cli.watch_failed",
            jobs = outcomes.len(),
            unfinished = unfinished,
            interrupted = interrupted,
        );
        Err(format!("{} of {} job(s) did not complete", unfinished, outcomes.len()).into())
    }
}

fn unique_job_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for id in ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    unique
}

async fn watch_jobs(
    config: &ExplainerConfig,
    job_ids: &[String],
    json_output: bool,
) -> Result<(Vec<JobOutcome>, bool), Box<dyn std::error::Error>> {
    let fetcher: Arc<dyn StatusFetcher> = Arc::new(AjaxStatusFetcher::from_config(&config.ajax)?);
    let lifecycle = PageLifecycle::new();
    let adapter = JobConnectionAdapter::with_lifecycle(
        fetcher,
        AdapterConfig::from_config(config),
        lifecycle.clone(),
    );
    adapter.on_error(move |report| print_error(report, json_output));
    adapter.initialise()?;

    let tracked = TrackedJobs::new();
    let mut handles: Vec<SubscriptionHandle> = Vec::with_capacity(job_ids.len());
    for job_id in job_ids {
        tracked.track(job_id.clone());
        let sink = tracked.clone();
        let owner = adapter.clone();
        let handle = adapter.connect(
            job_id.clone(),
            move |update, ctx| {
                sink.record_update(&ctx.id, update);
                print_update(&ctx.id, update, json_output);
                // Deleted jobs never finish on their own.
                if update.status() == JobStatus::Deleted {
                    owner.disconnect(&ctx.id);
                }
            },
            ConnectOptions::new(),
        )?;
        handles.push(handle);
    }

    let panels = PollingManager::new(ManagerConfig::from_config(&config.panels), lifecycle.clone());
    if !json_output {
        start_progress_panel(&panels, &tracked, config)?;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let signal_task = tokio::spawn({
        let lifecycle = lifecycle.clone();
        let interrupted = Arc::clone(&interrupted);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                eprintln!("Interrupted, stopping...");
                warn!(event = "cli.watch.interrupted");
                lifecycle.unload();
            }
        }
    });

    let statuses =
        futures::future::join_all(handles.iter_mut().map(|handle| handle.finished())).await;
    signal_task.abort();

    panels.stop_all();
    adapter.disconnect_all();

    let outcomes = job_ids
        .iter()
        .zip(statuses)
        .map(|(id, connection)| JobOutcome {
            id: id.clone(),
            connection,
            job_status: tracked.status(id),
        })
        .collect();
    Ok((outcomes, interrupted.load(Ordering::SeqCst)))
}

/// Periodic one-line summary on stderr while jobs are still moving.
fn start_progress_panel(
    panels: &PollingManager,
    tracked: &TrackedJobs,
    config: &ExplainerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = tracked.clone();
    let options = PanelOptions::new(move || {
        let jobs = jobs.clone();
        async move {
            let summary = jobs.summary();
            eprintln!(
                "{} pending, {} processing, {} completed, {} failed",
                summary.pending, summary.processing, summary.completed, summary.failed
            );
        }
    })
    .interval(config.panels.interval())
    .has_work(tracked.as_probe());

    panels.start_conditional_polling(PROGRESS_PANEL, options)?;
    Ok(())
}

fn print_update(id: &str, update: &JobUpdate, json_output: bool) {
    if json_output {
        print_json(&OutputLine::Update { id, update });
    } else {
        println!("{}", format_update(id, update));
    }
}

fn print_error(report: &ErrorReport, json_output: bool) {
    if json_output {
        print_json(&OutputLine::Error { report });
        return;
    }
    let scope = report.context.progress_id.as_deref().unwrap_or("adapter");
    match &report.error {
        Some(detail) => eprintln!(
            "[{}] {}: {} ({})",
            scope, report.message, detail, report.error_code
        ),
        None => eprintln!("[{}] {} ({})", scope, report.message, report.error_code),
    }
}

fn format_update(id: &str, update: &JobUpdate) -> String {
    let mut line = format!("[{}] {}", id, update.status());
    match &update.state {
        JobState::Processing => {
            if let Some(percent) = update.progress_percent {
                line.push_str(&format!(" {:.0}%", percent));
            }
        }
        JobState::Completed {
            post_info: Some(info),
        } => {
            if let Some(url) = info.get("edit_url").and_then(|v| v.as_str()) {
                line.push_str(&format!(" (edit: {})", url));
            }
        }
        JobState::Failed { error_message } => {
            line.push_str(&format!(": {}", error_message));
            return line;
        }
        _ => {}
    }
    if let Some(text) = update.progress_text.as_deref().filter(|t| !t.is_empty()) {
        line.push_str(&format!(" - {}", text));
    }
    line
}

fn print_summary(outcomes: &[JobOutcome], interrupted: bool) {
    println!();
    if interrupted {
        println!("Stopped before every job finished.");
    }
    for outcome in outcomes {
        let status = match outcome.job_status {
            Some(status) if outcome.connection == ConnectionStatus::Failed => {
                format!("{} (gave up after repeated errors)", status)
            }
            Some(status) => status.to_string(),
            None => "unknown".to_string(),
        };
        println!("  {}: {}", outcome.id, status);
    }
    let completed = outcomes.iter().filter(|o| o.succeeded()).count();
    println!("{} of {} job(s) completed", completed, outcomes.len());
}
