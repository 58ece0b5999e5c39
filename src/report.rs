use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};

use crate::models::{InferenceResult, PredictionRow, RiskLevelSummary};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Shapes the pipeline output: GPA to two decimals, label untouched.
pub fn format_result(predicted_gpa: f64, risk_label: String) -> InferenceResult {
    InferenceResult {
        predicted_gpa: round2(predicted_gpa),
        risk_label,
    }
}

pub fn cutoff_time(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

fn student_label(row: &PredictionRow) -> String {
    match (&row.student_name, &row.enrollment_no) {
        (Some(name), Some(enrollment)) => format!("{name} ({enrollment})"),
        (Some(name), None) => name.clone(),
        (None, Some(enrollment)) => enrollment.clone(),
        (None, None) => format!("unnamed student {}", row.id),
    }
}

/// Number of students listed under "Lowest Predicted CGPA".
pub const LOWEST_LISTED: i64 = 10;

/// Renders the window's risk mix and its lowest predictions. Both inputs
/// arrive already ordered.
pub fn build_report(
    since_days: i64,
    cutoff: DateTime<Utc>,
    summaries: &[RiskLevelSummary],
    lowest: &[PredictionRow],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Outcome Prediction Report");
    let _ = writeln!(
        output,
        "Predictions from the last {} days (since {})",
        since_days.max(1),
        cutoff.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Level Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No predictions recorded for this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg predicted CGPA {:.2})",
                summary.risk_label, summary.count, summary.avg_predicted_gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Predicted CGPA");

    if lowest.is_empty() {
        let _ = writeln!(output, "No predictions recorded for this window.");
    } else {
        for row in lowest.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.2} ({} risk) on {}",
                student_label(row),
                row.predicted_gpa,
                row.risk_label,
                row.created_at.format("%Y-%m-%d")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn row(name: &str, gpa: f64, risk: &str) -> PredictionRow {
        PredictionRow {
            id: Uuid::new_v4(),
            student_name: Some(name.to_string()),
            enrollment_no: None,
            predicted_gpa: gpa,
            risk_label: risk.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rounds_gpa_to_two_decimals() {
        let result = format_result(7.4567, "Low".to_string());
        assert_eq!(result.predicted_gpa, 7.46);
        assert_eq!(result.risk_label, "Low");
        assert_eq!(round2(6.0), 6.0);
    }

    fn summary(risk: &str, count: usize, avg: f64) -> RiskLevelSummary {
        RiskLevelSummary {
            risk_label: risk.to_string(),
            count,
            avg_predicted_gpa: avg,
        }
    }

    #[test]
    fn report_renders_the_risk_mix() {
        let summaries = vec![summary("Low", 2, 7.5), summary("High", 1, 5.0)];
        let report = build_report(30, cutoff_time(30), &summaries, &[]);
        assert!(report.contains("- Low: 2 students (avg predicted CGPA 7.50)"));
        assert!(report.contains("- High: 1 students (avg predicted CGPA 5.00)"));
    }

    #[test]
    fn report_keeps_older_low_predictions() {
        let mut old = row("Jules Moreno", 4.2, "High");
        old.created_at = Utc::now() - Duration::days(25);
        let lowest = vec![old, row("Avery Lee", 8.0, "Low")];
        let report = build_report(30, cutoff_time(30), &[], &lowest);

        let lowest_section = report.split("## Lowest Predicted CGPA").nth(1).unwrap();
        let jules = lowest_section.find("Jules Moreno").unwrap();
        let avery = lowest_section.find("Avery Lee").unwrap();
        assert!(jules < avery);
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(7, cutoff_time(7), &[], &[]);
        assert!(report.contains("No predictions recorded for this window."));
    }
}
