use std::fmt::Write;

use chrono::NaiveDate;

use crate::error::GpaError;
use crate::gpa::{round2, RecordSet};
use crate::models::{CgpaHistoryEntry, UserRecord};

pub fn build_report(
    user: &UserRecord,
    generated_on: NaiveDate,
    record_set: &RecordSet,
    history: &[CgpaHistoryEntry],
) -> Result<String, GpaError> {
    let overall = record_set.overall()?;
    let mut output = String::new();

    let _ = writeln!(output, "# GradeMaster Transcript");
    let _ = writeln!(
        output,
        "Generated for {} <{}> on {}",
        user.full_name, user.email, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Standing");

    match (overall.scale, overall.classification) {
        (Some(scale), Some(classification)) => {
            let _ = writeln!(
                output,
                "- Overall CGPA: {:.2} on the {} scale across {} credit units",
                overall.rounded_average(),
                scale,
                overall.total_credits
            );
            let _ = writeln!(output, "- Classification: {}", classification);
        }
        _ => {
            let _ = writeln!(output, "No courses recorded yet.");
        }
    }

    for group in record_set.groups() {
        let summary = group.summary();
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "## {} Scale (GPA {:.2}, {} credit units)",
            group.scale(),
            summary.rounded(),
            summary.total_credits
        );
        let _ = writeln!(output);
        let _ = writeln!(output, "| Course | Credits | Grade | Semester | Level |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for course in group.courses() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                course.name, course.credit_units, course.grade, course.semester, course.level
            );
        }

        let semesters = group.semester_breakdown()?;
        if semesters.len() > 1 {
            let _ = writeln!(output);
            let _ = writeln!(output, "Semester breakdown:");
            for semester in semesters {
                let label = if semester.semester.is_empty() {
                    "unspecified"
                } else {
                    semester.semester.as_str()
                };
                let _ = writeln!(
                    output,
                    "- {}: GPA {:.2} over {} courses ({} credit units)",
                    label,
                    semester.summary.rounded(),
                    semester.course_count,
                    semester.summary.total_credits
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent CGPA History");

    if history.is_empty() {
        let _ = writeln!(output, "No history recorded yet.");
    } else {
        for entry in history.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: {:.2} on {} scale{}",
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                round2(entry.average),
                entry.scale,
                entry
                    .semester
                    .as_deref()
                    .map(|semester| format!(" ({semester})"))
                    .unwrap_or_default()
            );
        }
    }

    Ok(output)
}
