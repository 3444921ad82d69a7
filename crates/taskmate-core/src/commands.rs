use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::activity::today_summary;
use crate::cli::{Command, FocusArgs, ReportArgs};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::parse_instant_expr;
use crate::period::Period;
use crate::render::Renderer;
use crate::report::{ReportContext, fetch_report};
use crate::source::RecordSink;
use crate::timer::{FocusTarget, FocusTimer, TimerState, spawn_focus_timer};

const DEFAULT_FOCUS_MINUTES: u64 = 25;
const TICK_PERIOD: Duration = Duration::from_secs(1);

#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or_else(|| Command::Report(ReportArgs::default()));
    debug!(?command, "dispatching command");

    match command {
        Command::Report(args) => cmd_report(store, cfg, renderer, args),
        Command::Focus(args) => cmd_focus(store, cfg, renderer, args),
        Command::Today => cmd_today(store, cfg, renderer),
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_report(store: &DataStore, cfg: &Config, renderer: &Renderer, args: ReportArgs) -> anyhow::Result<()> {
    let tz = cfg.timezone();
    let period = match args.period.as_deref() {
        Some(raw) => raw.parse::<Period>()?,
        None => Period::parse_or_today(&cfg.get("report.period").unwrap_or_default()),
    };
    let now = match args.now.as_deref() {
        Some(expr) => parse_instant_expr(expr, Utc::now(), &tz)
            .with_context(|| format!("invalid --now value {expr:?}"))?,
        None => Utc::now(),
    };
    let ctx = ReportContext::new(now, tz);

    let outcome = runtime()?.block_on(fetch_report(store, period, &ctx));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        renderer.print_report(&outcome.report, &tz)?;
    }

    match outcome.error {
        Some(err) => Err(err.context("report shown without data")),
        None => Ok(()),
    }
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_focus(store: &DataStore, cfg: &Config, renderer: &Renderer, args: FocusArgs) -> anyhow::Result<()> {
    let minutes = match args.minutes {
        Some(minutes) => minutes,
        None => cfg.get_u64("focus.minutes")?.unwrap_or(DEFAULT_FOCUS_MINUTES),
    };

    let title = match (args.title, args.task_id.as_deref()) {
        (Some(title), _) => title,
        (None, Some(id)) => store
            .load_tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .map(|task| task.title)
            .unwrap_or_else(|| {
                warn!(task_id = id, "task not found; recording session without a title");
                String::new()
            }),
        (None, None) => String::new(),
    };

    let timer = FocusTimer::new(
        FocusTarget {
            task_id: args.task_id,
            title,
        },
        minutes,
    )?;

    let timer = runtime()?.block_on(run_focus(timer, renderer))?;
    let session = timer.finish_session(&cfg.timezone())?;
    store
        .record_session(&session)
        .context("failed to record focus session")?;
    renderer.print_session(&session)?;
    Ok(())
}

/// Drives the countdown until it completes or Ctrl-C stops it.
async fn run_focus(timer: FocusTimer, renderer: &Renderer) -> anyhow::Result<FocusTimer> {
    let (handle, join) = spawn_focus_timer(timer, TICK_PERIOD, Utc::now())?;
    let mut updates = handle.subscribe();
    let mut last_state = handle.snapshot().state;
    renderer.print_timer(&handle.snapshot())?;
    let mut interrupted = false;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *updates.borrow_and_update();
                last_state = snapshot.state;
                renderer.print_timer(&snapshot)?;
                if snapshot.state.is_finished() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("failed to listen for Ctrl-C")?;
                interrupted = true;
                info!("interrupt received; stopping focus timer");
                if let Err(err) = handle.stop().await {
                    warn!(error = %err, "stop request was not applied");
                }
            }
        }
    }

    let timer = join.await.context("focus timer task failed")?;
    if last_state != timer.state() && timer.state() != TimerState::Idle {
        renderer.print_timer(&timer.snapshot())?;
    }
    Ok(timer)
}

#[instrument(skip(store, cfg, renderer))]
fn cmd_today(store: &DataStore, cfg: &Config, renderer: &Renderer) -> anyhow::Result<()> {
    let sessions = store.load_sessions()?;
    let summary = today_summary(&sessions, Utc::now(), &cfg.timezone());
    renderer.print_today(&summary)
}
