//! Focus countdown.
//!
//! [`FocusTimer`] is a plain state machine advanced one second per
//! [`FocusTimer::tick`]. [`spawn_focus_timer`] drives it from a tokio interval
//! and hands back a [`TimerHandle`] for pause/resume/stop.

use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::datetime::local_date;
use crate::record::FocusSession;

pub const MIN_FOCUS_MINUTES: u64 = 1;
pub const MAX_FOCUS_MINUTES: u64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl TimerState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not running; the counter was left alone.
    Ignored,
    Counted,
    Completed,
}

/// The task a session is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusTarget {
    pub task_id: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
}

impl TimerSnapshot {
    /// Remaining time as `MM:SS`.
    pub fn clock(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct FocusTimer {
    target: FocusTarget,
    total_seconds: u64,
    remaining_seconds: u64,
    state: TimerState,
    started_at: Option<DateTime<Utc>>,
}

impl FocusTimer {
    /// A timer for `minutes`, which must lie in
    /// `MIN_FOCUS_MINUTES..=MAX_FOCUS_MINUTES`.
    pub fn new(target: FocusTarget, minutes: u64) -> anyhow::Result<Self> {
        if !(MIN_FOCUS_MINUTES..=MAX_FOCUS_MINUTES).contains(&minutes) {
            return Err(anyhow!(
                "focus duration must be between {MIN_FOCUS_MINUTES} and \
                 {MAX_FOCUS_MINUTES} minutes, got {minutes}"
            ));
        }
        Self::from_seconds(target, minutes * 60)
    }

    pub fn from_seconds(target: FocusTarget, seconds: u64) -> anyhow::Result<Self> {
        if seconds == 0 {
            return Err(anyhow!("focus duration must be positive"));
        }
        Ok(Self {
            target,
            total_seconds: seconds,
            remaining_seconds: seconds,
            state: TimerState::Idle,
            started_at: None,
        })
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn target(&self) -> &FocusTarget {
        &self.target
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.total_seconds - self.remaining_seconds
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Fraction of the countdown already spent, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.elapsed_seconds() as f64 / self.total_seconds as f64
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state,
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_seconds,
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.transition("start", &[TimerState::Idle], TimerState::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn pause(&mut self) -> anyhow::Result<()> {
        self.transition("pause", &[TimerState::Running], TimerState::Paused)
    }

    pub fn resume(&mut self) -> anyhow::Result<()> {
        self.transition("resume", &[TimerState::Paused], TimerState::Running)
    }

    /// Ends the countdown early. The elapsed time is kept for the session.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.transition(
            "stop",
            &[TimerState::Running, TimerState::Paused],
            TimerState::Cancelled,
        )
    }

    /// Returns a finished timer to `Idle` with the full duration restored.
    pub fn reset(&mut self) -> anyhow::Result<()> {
        self.transition(
            "reset",
            &[TimerState::Completed, TimerState::Cancelled],
            TimerState::Idle,
        )?;
        self.remaining_seconds = self.total_seconds;
        self.started_at = None;
        Ok(())
    }

    /// Advances the countdown by one second while running.
    pub fn tick(&mut self) -> Tick {
        if self.state != TimerState::Running {
            return Tick::Ignored;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = TimerState::Completed;
            return Tick::Completed;
        }
        Tick::Counted
    }

    /// Session record for a finished timer: completed when the countdown ran
    /// out, not completed when it was stopped.
    pub fn finish_session(&self, tz: &Tz) -> anyhow::Result<FocusSession> {
        if !self.state.is_finished() {
            return Err(anyhow!("timer is {}; no session to record", self.state));
        }
        let started_at = self
            .started_at
            .ok_or_else(|| anyhow!("finished timer has no start time"))?;
        Ok(FocusSession::new(
            self.target.task_id.clone(),
            self.target.title.clone(),
            self.elapsed_seconds(),
            started_at,
            self.state == TimerState::Completed,
            local_date(started_at, tz),
        ))
    }

    fn transition(
        &mut self,
        action: &str,
        from: &[TimerState],
        to: TimerState,
    ) -> anyhow::Result<()> {
        if !from.contains(&self.state) {
            return Err(anyhow!("cannot {action} a timer that is {}", self.state));
        }
        debug!(from = %self.state, to = %to, "timer transition");
        self.state = to;
        Ok(())
    }
}

/// `MM:SS`; minutes are not wrapped into hours.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug)]
enum Control {
    Pause(oneshot::Sender<anyhow::Result<()>>),
    Resume(oneshot::Sender<anyhow::Result<()>>),
    Stop(oneshot::Sender<anyhow::Result<()>>),
}

/// Control side of a running timer. Dropping every handle does not cancel the
/// countdown; it runs to completion.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    control: mpsc::UnboundedSender<Control>,
    snapshots: watch::Receiver<TimerSnapshot>,
}

impl TimerHandle {
    pub async fn pause(&self) -> anyhow::Result<()> {
        self.request(Control::Pause).await
    }

    pub async fn resume(&self) -> anyhow::Result<()> {
        self.request(Control::Resume).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.request(Control::Stop).await
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        *self.snapshots.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<anyhow::Result<()>>) -> Control,
    ) -> anyhow::Result<()> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(make(reply))
            .map_err(|_| anyhow!("focus timer is no longer running"))?;
        response
            .await
            .map_err(|_| anyhow!("focus timer finished before answering"))?
    }
}

/// Starts `timer` (if idle) and counts it down on a tokio interval of
/// `period`. The join handle yields the timer once it completes or is
/// stopped. Must be called inside a tokio runtime.
#[instrument(skip(timer, now), fields(total = timer.total_seconds()))]
pub fn spawn_focus_timer(
    mut timer: FocusTimer,
    period: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<(TimerHandle, JoinHandle<FocusTimer>)> {
    if period.is_zero() {
        return Err(anyhow!("timer tick period must be positive"));
    }
    if timer.state() == TimerState::Idle {
        timer.start(now)?;
    } else if !timer.state().is_active() {
        return Err(anyhow!("cannot run a timer that is {}", timer.state()));
    }

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(timer.snapshot());
    let join = tokio::spawn(drive(timer, period, control_rx, snapshot_tx));
    info!("focus timer started");

    Ok((
        TimerHandle {
            control: control_tx,
            snapshots: snapshot_rx,
        },
        join,
    ))
}

async fn drive(
    mut timer: FocusTimer,
    period: Duration,
    mut control: mpsc::UnboundedReceiver<Control>,
    snapshots: watch::Sender<TimerSnapshot>,
) -> FocusTimer {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut controls_open = true;

    while timer.state().is_active() {
        tokio::select! {
            _ = ticks.tick() => {
                if timer.tick() == Tick::Completed {
                    info!(seconds = timer.total_seconds(), "focus session completed");
                }
            }
            command = control.recv(), if controls_open => {
                match command {
                    Some(command) => apply(&mut timer, command),
                    None => {
                        controls_open = false;
                        debug!("all timer handles dropped; running to completion");
                    }
                }
            }
        }
        snapshots.send_replace(timer.snapshot());
    }

    timer
}

fn apply(timer: &mut FocusTimer, command: Control) {
    let (result, reply) = match command {
        Control::Pause(reply) => (timer.pause(), reply),
        Control::Resume(reply) => (timer.resume(), reply),
        Control::Stop(reply) => {
            let result = timer.stop();
            if result.is_ok() {
                info!(elapsed = timer.elapsed_seconds(), "focus session stopped");
            }
            (result, reply)
        }
    };
    if let Err(err) = &result {
        warn!(error = %err, "rejected timer command");
    }
    if reply.send(result).is_err() {
        debug!("timer command caller went away");
    }
}
