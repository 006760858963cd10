use std::io::{self, BufRead, Write};
use std::time::Duration;

use indexmap::IndexMap;

use super::{Score, UserAnswer};
use crate::model::QuestionRecord;

const RULE_WIDTH: usize = 72;

/// Splash screen. Returns `false` if input closed before ENTER.
pub fn show_welcome<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    questions: usize,
    time_limit: Duration,
) -> io::Result<bool> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{}", rule)?;
    writeln!(out, "Exam Simulation")?;
    writeln!(out, "Questions:  {}", questions)?;
    writeln!(out, "Time Limit: {} mins", time_limit.as_secs() / 60)?;
    writeln!(out, "{}", rule)?;
    write!(out, "\nPress ENTER to start...")?;
    out.flush()?;

    let mut line = String::new();
    Ok(input.read_line(&mut line)? > 0)
}

pub fn show_header<W: Write>(
    out: &mut W,
    current: usize,
    total: usize,
    remaining: Duration,
) -> io::Result<()> {
    let left = format!("Question {}/{}", current, total);
    let right = format!("Time Remaining: {}", format_clock(remaining));
    let pad = RULE_WIDTH.saturating_sub(left.len() + right.len()).max(1);
    writeln!(out, "\n{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out, "{}{}{}", left, " ".repeat(pad), right)?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}

/// `MM:SS`; minutes are not wrapped into hours.
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Show one question and read a selection, re-prompting on bad input.
/// `None` means input ended.
pub fn ask_question<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &QuestionRecord,
) -> io::Result<Option<Vec<String>>> {
    let multiple = question.is_multiple_choice();

    writeln!(out, "\nID: {}\n", question.id)?;
    writeln!(out, "{}\n", question.text)?;
    for (label, text) in &question.options {
        writeln!(out, "  {}) {}", label, text)?;
    }
    if multiple {
        writeln!(
            out,
            "\nMultiple correct answers allowed (separate labels with commas or spaces)."
        )?;
    }

    let prompt = if multiple {
        "Select your answer(s): "
    } else {
        "Select your answer: "
    };

    loop {
        write!(out, "\n{}", prompt)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse_selection(&line, &question.options, multiple) {
            Ok(selected) => return Ok(Some(selected)),
            Err(msg) => writeln!(out, "{}", msg)?,
        }
    }
}

/// Parse typed labels (`A`, `a,c`, `A C`, `b)`) into option keys as they
/// appear in `options`. Duplicates collapse; order of first mention is kept.
pub fn parse_selection(
    line: &str,
    options: &IndexMap<String, String>,
    multiple: bool,
) -> Result<Vec<String>, String> {
    let mut selected: Vec<String> = Vec::new();

    let tokens = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim_end_matches(&[')', '.'][..]))
        .filter(|t| !t.is_empty());

    for token in tokens {
        let Some(label) = options.keys().find(|k| k.eq_ignore_ascii_case(token)) else {
            let valid: Vec<&str> = options.keys().map(String::as_str).collect();
            return Err(format!(
                "Unknown option '{}'. Choose from: {}",
                token,
                valid.join(", ")
            ));
        };
        if !selected.contains(label) {
            selected.push(label.clone());
        }
    }

    if selected.is_empty() {
        return Err("Please select an answer.".to_string());
    }
    if !multiple && selected.len() > 1 {
        return Err("Select exactly one answer.".to_string());
    }
    Ok(selected)
}

/// Score summary followed by a per-question review table.
pub fn show_results<W: Write>(out: &mut W, score: Score, answers: &[UserAnswer]) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{}", rule)?;
    writeln!(out, "Exam Completed")?;
    writeln!(out, "Score:      {}/{}", score.correct, score.total)?;
    writeln!(out, "Percentage: {:.1}%", score.percentage)?;
    writeln!(out, "{}", rule)?;

    if answers.is_empty() {
        return Ok(());
    }

    let id_width = answers
        .iter()
        .map(|a| a.question.id.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    writeln!(out, "\nDetailed Review")?;
    writeln!(
        out,
        "{:<w$} | {:<7} | {:<12} | {}",
        "Q.ID",
        "Result",
        "Your Answer",
        "Correct Answer",
        w = id_width
    )?;
    writeln!(out, "{}", "-".repeat(id_width + 42))?;

    for answer in answers {
        writeln!(
            out,
            "{:<w$} | {:<7} | {:<12} | {}",
            answer.question.id,
            if answer.is_correct() { "correct" } else { "wrong" },
            answer.selected.join(", "),
            answer.question.correct_answers.join(", "),
            w = id_width
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample;
    use std::io::Cursor;

    fn options() -> IndexMap<String, String> {
        sample("Q", &[("A", "a"), ("B", "b"), ("C", "c"), ("D", "d")], &[]).options
    }

    #[test]
    fn selection_formats() {
        let opts = options();
        assert_eq!(parse_selection("A\n", &opts, false).unwrap(), vec!["A"]);
        assert_eq!(parse_selection(" b) ", &opts, false).unwrap(), vec!["B"]);
        assert_eq!(parse_selection("a,c", &opts, true).unwrap(), vec!["A", "C"]);
        assert_eq!(parse_selection("D C", &opts, true).unwrap(), vec!["D", "C"]);
        assert_eq!(parse_selection("a, A ,c", &opts, true).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn bad_selections() {
        let opts = options();
        assert!(parse_selection("E", &opts, false)
            .unwrap_err()
            .contains("Choose from: A, B, C, D"));
        assert!(parse_selection("  \n", &opts, true).is_err());
        assert!(parse_selection("A B", &opts, false).is_err());
    }

    #[test]
    fn ask_reprompts_until_valid() {
        let q = sample("Question 4", &[("A", "x"), ("B", "y"), ("C", "z")], &["A", "C"]);
        let mut out = Vec::new();

        let got = ask_question(&mut Cursor::new("Z\n\nc a\n"), &mut out, &q).unwrap();

        assert_eq!(got, Some(vec!["C".to_string(), "A".to_string()]));
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("ID: Question 4"));
        assert!(shown.contains("  B) y"));
        assert!(shown.contains("Multiple correct answers allowed"));
        assert_eq!(shown.matches("Select your answer(s): ").count(), 3);
    }

    #[test]
    fn ask_returns_none_at_eof() {
        let q = sample("Question 1", &[("A", "x"), ("B", "y")], &["A"]);
        let mut out = Vec::new();
        assert_eq!(ask_question(&mut Cursor::new("Q\n"), &mut out, &q).unwrap(), None);
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(Duration::from_secs(15 * 60)), "15:00");
        assert_eq!(format_clock(Duration::from_millis(65_900)), "01:05");
        assert_eq!(format_clock(Duration::ZERO), "00:00");
    }

    #[test]
    fn header_line() {
        let mut out = Vec::new();
        show_header(&mut out, 2, 10, Duration::from_secs(125)).unwrap();
        let shown = String::from_utf8(out).unwrap();
        let line = shown.lines().nth(2).unwrap();
        assert!(line.starts_with("Question 2/10"));
        assert!(line.ends_with("Time Remaining: 02:05"));
        assert_eq!(line.len(), RULE_WIDTH);
    }

    #[test]
    fn results_table() {
        let answers = vec![
            UserAnswer {
                question: sample("Question 12", &[("A", "x"), ("B", "y")], &["B"]),
                selected: vec!["B".into()],
            },
            UserAnswer {
                question: sample("Question 3", &[("A", "x"), ("B", "y"), ("C", "z")], &["A", "C"]),
                selected: vec!["A".into()],
            },
        ];
        let score = Score {
            correct: 1,
            total: 2,
            percentage: 50.0,
        };
        let mut out = Vec::new();
        show_results(&mut out, score, &answers).unwrap();
        let shown = String::from_utf8(out).unwrap();

        assert!(shown.contains("Score:      1/2"));
        assert!(shown.contains("Percentage: 50.0%"));
        assert!(shown.contains("Question 12 | correct | B            | B\n"));
        assert!(shown.contains("Question 3  | wrong   | A            | A, C\n"));
    }

    #[test]
    fn welcome_waits_for_enter() {
        let mut out = Vec::new();
        assert!(show_welcome(&mut Cursor::new("\n"), &mut out, 5, Duration::from_secs(900)).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("Time Limit: 15 mins"));
        let mut out = Vec::new();
        assert!(!show_welcome(&mut Cursor::new(""), &mut out, 5, Duration::from_secs(900)).unwrap());
    }
}
