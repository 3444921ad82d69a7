use serde::Serialize;
use tracing::debug;

use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    OutstandingPerformance,
    GoodProgress,
    ImproveCompletion,
    ExcellentFocus,
    OptimizeFocusTime,
    PriorityAlert,
    GreatDiscipline,
    GetStarted,
    TrackProgress,
    StayFocused,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    pub icon: &'static str,
    pub title: &'static str,
    pub message: String,
}

impl Insight {
    fn new(kind: InsightKind, icon: &'static str, title: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            icon,
            title,
            message: message.into(),
        }
    }
}

/// Evaluates the fixed rule list in display order. Rules are independent;
/// several may fire. When none does, the onboarding set is returned.
#[tracing::instrument(skip_all)]
pub fn generate_insights(metrics: &Metrics) -> Vec<Insight> {
    let mut insights = Vec::new();
    let rate = exact_percent(metrics.completed_count, metrics.total_count).unwrap_or(0.0);

    if rate > 80.0 {
        insights.push(Insight::new(
            InsightKind::OutstandingPerformance,
            "🎉",
            "Outstanding Performance",
            "Excellent! Your completion rate is over 80%. Keep up the great work!",
        ));
    }
    if rate > 50.0 && rate <= 80.0 {
        insights.push(Insight::new(
            InsightKind::GoodProgress,
            "👍",
            "Good Progress",
            "Good progress! You're completing more than half of your tasks.",
        ));
    }
    if metrics.total_count > 0 && rate <= 50.0 {
        insights.push(Insight::new(
            InsightKind::ImproveCompletion,
            "💡",
            "Improve Completion",
            "Try breaking down larger tasks into smaller, manageable steps to improve completion rate.",
        ));
    }

    let focus = metrics.average_focus_minutes;
    if focus > 30.0 {
        insights.push(Insight::new(
            InsightKind::ExcellentFocus,
            "⭐",
            "Excellent Focus",
            "Your average focus session is over 30 minutes. Excellent concentration!",
        ));
    }
    if focus > 0.0 && focus <= 30.0 {
        insights.push(Insight::new(
            InsightKind::OptimizeFocusTime,
            "⏰",
            "Optimize Focus Time",
            "Consider longer focus sessions (25-45 minutes) for better productivity.",
        ));
    }

    let pending = metrics.pending_high_priority_count;
    if pending > 0 {
        let noun = if pending == 1 { "task" } else { "tasks" };
        insights.push(Insight::new(
            InsightKind::PriorityAlert,
            "🎯",
            "Priority Alert",
            format!("You have {pending} high-priority {noun} pending. Focus on these first!"),
        ));
    }

    if exact_percent(metrics.completed_session_count, metrics.session_count)
        .is_some_and(|session_rate| session_rate > 80.0)
    {
        insights.push(Insight::new(
            InsightKind::GreatDiscipline,
            "🏆",
            "Great Discipline",
            "You're completing most of your focus sessions! Great discipline!",
        ));
    }

    if insights.is_empty() {
        debug!("no insight rule fired; returning onboarding set");
        return onboarding_insights();
    }
    debug!(count = insights.len(), "generated insights");
    insights
}

pub fn onboarding_insights() -> Vec<Insight> {
    vec![
        Insight::new(
            InsightKind::GetStarted,
            "💪",
            "Get Started",
            "Start adding tasks and focus sessions to get personalized insights!",
        ),
        Insight::new(
            InsightKind::TrackProgress,
            "📊",
            "Track Progress",
            "Complete tasks to see your productivity trends and patterns.",
        ),
        Insight::new(
            InsightKind::StayFocused,
            "🎯",
            "Stay Focused",
            "Use focus sessions to improve concentration and track deep work.",
        ),
    ]
}

/// Unrounded percentage; the rounded figures on [`Metrics`] are for display
/// and would move the rule boundaries.
fn exact_percent(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part.min(whole) as f64 / whole as f64 * 100.0)
}
