use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::activity::{ActivityKind, TodaySummary};
use crate::config::Config;
use crate::datetime::format_local_date;
use crate::record::FocusSession;
use crate::report::Report;
use crate::series::{Breakdown, Series};
use crate::timer::{TimerSnapshot, TimerState, format_clock};

const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, report, tz), fields(period = %report.period))]
    pub fn print_report(&self, report: &Report, tz: &Tz) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_report(&mut out, report, tz)
    }

    pub fn write_report<W: Write>(&self, mut out: W, report: &Report, tz: &Tz) -> anyhow::Result<()> {
        let metrics = &report.metrics;
        let title = format!(
            "Insights: {} ({} .. {})",
            report.period,
            format_local_date(report.range.start, tz),
            format_local_date(report.range.end, tz)
        );
        writeln!(out, "{}", self.paint(&title, "1"))?;
        writeln!(out)?;

        let session_rate = metrics
            .session_completion_rate_percent
            .map(|rate| format!("{rate}%"))
            .unwrap_or_else(|| "-".to_string());
        let rows = vec![
            vec![
                "Tasks completed".to_string(),
                format!("{}/{}", metrics.completed_count, metrics.total_count),
                String::new(),
            ],
            vec![
                "Completion rate".to_string(),
                format!("{}%", metrics.completion_rate_percent),
                report.trends.completion.to_string(),
            ],
            vec![
                "Focus time".to_string(),
                report.trends.total_focus.clone(),
                format!("{} sessions", metrics.session_count),
            ],
            vec![
                "Average session".to_string(),
                format!("{:.0}m", metrics.average_focus_minutes),
                format!("{session_rate} finished"),
            ],
            vec![
                "Productivity".to_string(),
                self.paint(&metrics.productivity_score.to_string(), score_color(metrics.productivity_score)),
                report.trends.productivity.to_string(),
            ],
            vec![
                "High priority pending".to_string(),
                metrics.pending_high_priority_count.to_string(),
                String::new(),
            ],
        ];
        write_table(
            &mut out,
            vec!["Metric".to_string(), "Value".to_string(), "Trend".to_string()],
            rows,
        )?;

        self.write_series(&mut out, "Completed per day", &report.series.completion_trend, "")?;
        self.write_series(&mut out, "Focus minutes per day", &report.series.focus_time, "m")?;
        self.write_breakdown(&mut out, "By priority", &report.series.priority_breakdown)?;
        self.write_breakdown(&mut out, "By list", &report.series.category_breakdown)?;

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Insights", "1"))?;
        for insight in &report.insights {
            writeln!(
                out,
                "  {} {}: {}",
                insight.icon,
                self.paint(insight.title, "36"),
                insight.message
            )?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Recent activity", "1"))?;
        if report.activity.is_empty() {
            writeln!(out, "  No recent activity")?;
        }
        for item in &report.activity {
            let detail = match item.kind {
                ActivityKind::Task => item
                    .priority
                    .map(|priority| format!("{priority} priority"))
                    .unwrap_or_default(),
                ActivityKind::Focus => item
                    .duration_minutes
                    .map(|minutes| format!("{minutes} min"))
                    .unwrap_or_default(),
            };
            writeln!(
                out,
                "  {} {}  {}",
                self.paint(&item.time_ago, "2"),
                item.title,
                detail
            )?;
        }

        Ok(())
    }

    fn write_series<W: Write>(&self, mut out: W, title: &str, series: &Series, unit: &str) -> anyhow::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", self.paint(title, "1"))?;
        if !series.has_data {
            writeln!(out, "  No data for this period")?;
            return Ok(());
        }

        let max = series
            .buckets
            .iter()
            .map(|bucket| bucket.value)
            .fold(0.0_f64, f64::max);
        let rows = series
            .buckets
            .iter()
            .map(|bucket| {
                let len = if max > 0.0 {
                    ((bucket.value / max) * BAR_WIDTH as f64).round() as usize
                } else {
                    0
                };
                vec![
                    bucket.day.format("%a %m-%d").to_string(),
                    format!("{:.0}{unit}", bucket.value),
                    self.paint(&"█".repeat(len), "32"),
                ]
            })
            .collect();
        write_table(
            &mut out,
            vec!["Day".to_string(), "Value".to_string(), String::new()],
            rows,
        )
    }

    fn write_breakdown<W: Write>(&self, mut out: W, title: &str, breakdown: &Breakdown) -> anyhow::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", self.paint(title, "1"))?;
        if !breakdown.has_data {
            writeln!(out, "  No data for this period")?;
            return Ok(());
        }

        let rows = breakdown
            .slices
            .iter()
            .map(|slice| vec![slice.label.clone(), slice.count.to_string()])
            .collect();
        write_table(&mut out, vec!["Name".to_string(), "Tasks".to_string()], rows)
    }

    #[tracing::instrument(skip(self, summary))]
    pub fn print_today(&self, summary: &TodaySummary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint("Today's focus", "1"))?;
        writeln!(out, "total      {}", summary.total_label())?;
        writeln!(out, "completed  {}", summary.completed_sessions)?;
        writeln!(out, "sessions   {}", summary.total_sessions)?;
        Ok(())
    }

    /// Rewrites a single status line on stderr.
    pub fn print_timer(&self, snapshot: &TimerSnapshot) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        let code = match snapshot.state {
            TimerState::Paused => "33",
            TimerState::Completed => "32",
            TimerState::Cancelled => "31",
            TimerState::Idle | TimerState::Running => "36",
        };
        write!(
            err,
            "\r{} {:<9}",
            self.paint_err(&snapshot.clock(), code),
            snapshot.state
        )?;
        if snapshot.state.is_finished() {
            writeln!(err)?;
        }
        err.flush()?;
        Ok(())
    }

    pub fn print_session(&self, session: &FocusSession) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let outcome = if session.completed { "completed" } else { "stopped" };
        writeln!(
            out,
            "Recorded {} focus session ({}) for {} on {}",
            outcome,
            format_clock(session.duration_seconds),
            if session.task_title.is_empty() { "no task" } else { session.task_title.as_str() },
            session.date
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn paint_err(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stderr().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn score_color(score: u8) -> &'static str {
    match score {
        70.. => "32",
        40..=69 => "33",
        _ => "31",
    }
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    write!(writer, "  ")?;
    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    write!(writer, "  ")?;
    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        write!(writer, "  ")?;
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
