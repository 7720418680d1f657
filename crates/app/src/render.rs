use std::fmt::Write as _;

use services::{QuestionView, SessionMode, SessionSnapshot};

/// Header line: title, position and remaining time.
pub fn header(snapshot: &SessionSnapshot) -> String {
    let mut line = snapshot
        .title
        .clone()
        .unwrap_or_else(|| format!("Exam {}", snapshot.exam_id));
    let position = snapshot.position_label();
    if !position.is_empty() {
        let _ = write!(line, "  [{position}]");
    }
    if let Some(remaining) = snapshot.remaining {
        let _ = write!(line, "  {}", remaining.display());
        if remaining.low && !remaining.expired {
            line.push_str(" (hurry!)");
        }
    }
    match snapshot.mode {
        SessionMode::Review => line.push_str("  REVIEW"),
        SessionMode::Preview => line.push_str("  PREVIEW"),
        SessionMode::Submitting => line.push_str("  submitting..."),
        SessionMode::Lobby | SessionMode::Playing => {}
    }
    line
}

fn option_marker(question: &QuestionView, option: &str) -> &'static str {
    let selected = question.selected.as_deref() == Some(option);
    let correct = question.correct_answer.as_deref() == Some(option);
    match (selected, correct, question.correct_answer.is_some()) {
        (true, true, _) => "[x] ok ",
        (true, false, true) => "[x] no ",
        (true, false, false) => "[x]    ",
        (false, true, _) => "[ ] ok ",
        (false, false, _) => "[ ]    ",
    }
}

/// Full question block with options and, when known, the answer key.
pub fn question(snapshot: &SessionSnapshot) -> String {
    let mut out = header(snapshot);
    out.push('\n');
    let Some(question) = &snapshot.question else {
        return out;
    };
    let _ = writeln!(out, "\n{}  ({} marks)", question.text, question.marks);
    for (i, option) in question.options.iter().enumerate() {
        let _ = writeln!(out, "  {} {}) {option}", option_marker(question, option), i + 1);
    }
    if let Some(explanation) = &question.explanation {
        let _ = writeln!(out, "\n  {explanation}");
    }
    if let Some(progress) = &snapshot.progress {
        if snapshot.mode == SessionMode::Playing && !progress.unanswered.is_empty() {
            let pending: Vec<String> = progress
                .unanswered
                .iter()
                .map(|i| (i + 1).to_string())
                .collect();
            let _ = writeln!(out, "\nUnanswered: {}", pending.join(", "));
        }
    }
    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(out, "\n! {error}");
    }
    out
}

/// Score block shown when entering review.
pub fn results(snapshot: &SessionSnapshot) -> String {
    let Some(score) = snapshot.score else {
        return String::from("Results are not available.");
    };
    format!(
        "Score: {} ({} of {} marks, {:.0}%)\nCorrect: {} of {} ({} answered)",
        score.score,
        score.earned_marks,
        score.total_marks,
        score.percentage(),
        score.correct,
        score.total,
        score.answered,
    )
}
