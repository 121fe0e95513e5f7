//! Markdown rendering of session analytics and aggregate history.

use telemetry_core::types::{ServerAggregateHistory, SessionAnalyticsSnapshot, SessionSummary};

/// Report generator for creating markdown summaries.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Render one session: overview, engagement table, user-count timeline,
    /// and short-attendance list.
    pub fn session_report(
        title: &str,
        snapshot: &SessionAnalyticsSnapshot,
        summary: Option<&SessionSummary>,
    ) -> String {
        let mut report = String::new();

        report.push_str(&format!("# Session Report\n\n**{}**\n\n", title));

        report.push_str("## Overview\n\n");
        let peak = snapshot
            .user_count_samples
            .iter()
            .map(|s| s.count)
            .max()
            .unwrap_or(0);
        report.push_str(&format!("- **Peak Users:** {}\n", peak));
        if let (Some(first), Some(last)) = (
            snapshot.user_count_samples.first(),
            snapshot.user_count_samples.last(),
        ) {
            let span = (last.at - first.at).num_seconds().max(0) as u64;
            report.push_str(&format!("- **Tracked Span:** {}\n", format_duration(span)));
        }
        if let Some(summary) = summary {
            report.push_str(&format!("- **Active Chatters:** {}\n", summary.user_count));
            report.push_str(&format!("- **Messages:** {}\n", summary.chat_count));
            report.push_str(&format!("- **Score:** {}\n", summary.score));
        }
        report.push_str(&format!(
            "- **Insincere Members:** {}\n\n",
            snapshot.insincere_members.len()
        ));

        if !snapshot.chat_counts.is_empty() {
            let mut ranked: Vec<_> = snapshot.chat_counts.iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

            report.push_str("## Engagement\n\n");
            report.push_str("| User | Messages |\n");
            report.push_str("|------|----------|\n");
            for (user, count) in ranked {
                report.push_str(&format!("| {} | {} |\n", user, count));
            }
            report.push('\n');
        }

        if !snapshot.user_count_samples.is_empty() {
            report.push_str("## Attendance Timeline\n\n");
            report.push_str("| Time (UTC) | Users |\n");
            report.push_str("|------------|-------|\n");
            for sample in &snapshot.user_count_samples {
                report.push_str(&format!(
                    "| {} | {} |\n",
                    sample.at.format("%Y-%m-%d %H:%M:%S"),
                    sample.count
                ));
            }
            report.push('\n');
        }

        if !snapshot.insincere_members.is_empty() {
            report.push_str("## Insincere Members\n\n");
            for user in &snapshot.insincere_members {
                report.push_str(&format!("- {}\n", user));
            }
            report.push('\n');
        }

        report
    }

    /// Render the cross-session history.
    pub fn history_report(history: &ServerAggregateHistory) -> String {
        let mut report = String::new();

        report.push_str("# Server History\n\n");

        report.push_str("## Overview\n\n");
        report.push_str(&format!("- **Sessions:** {}\n", history.session_count));
        report.push_str(&format!("- **Total Chatters:** {}\n", history.total_users()));
        report.push_str(&format!("- **Total Messages:** {}\n", history.total_chats()));
        match history.average_score() {
            Some(avg) => report.push_str(&format!("- **Average Score:** {:.1}\n", avg)),
            None => report.push_str("- **Average Score:** -\n"),
        }
        if let Some((idx, best)) = history.best_session() {
            report.push_str(&format!(
                "- **Best Session:** #{} (score {})\n",
                idx + 1,
                best.score
            ));
        }
        report.push('\n');

        if history.summaries.is_empty() {
            report.push_str("_No sessions recorded yet._\n");
            return report;
        }

        report.push_str("## Sessions\n\n");
        report.push_str("| # | Chatters | Messages | Score |\n");
        report.push_str("|---|----------|----------|-------|\n");
        for (i, summary) in history.summaries.iter().enumerate() {
            report.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                i + 1,
                summary.user_count,
                summary.chat_count,
                summary.score
            ));
        }
        report.push('\n');

        report
    }
}

/// Format seconds as a human-readable duration string.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
