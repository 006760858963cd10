pub mod ui;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::model::QuestionRecord;

/// One answered question.
#[derive(Debug, Clone)]
pub struct UserAnswer {
    pub question: QuestionRecord,
    pub selected: Vec<String>,
}

impl UserAnswer {
    /// Exact set match, order-independent. No partial credit.
    pub fn is_correct(&self) -> bool {
        let selected: BTreeSet<&str> = self.selected.iter().map(String::as_str).collect();
        let correct: BTreeSet<&str> = self
            .question
            .correct_answers
            .iter()
            .map(String::as_str)
            .collect();
        selected == correct
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub correct: usize,
    pub total: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    TimeUp,
    /// Input closed mid-session; no report is produced.
    Cancelled,
}

/// Question selection, timer and scoring for one quiz session.
pub struct QuizEngine {
    questions: Vec<QuestionRecord>,
    answers: Vec<UserAnswer>,
    time_limit: Duration,
    started: Option<Instant>,
}

impl QuizEngine {
    pub fn new(
        pool: impl IntoIterator<Item = QuestionRecord>,
        max_questions: usize,
        time_limit: Duration,
    ) -> Self {
        Self::with_rng(pool, max_questions, time_limit, &mut rand::thread_rng())
    }

    /// Drops records without known answers, shuffles the rest and keeps at
    /// most `max_questions`.
    pub fn with_rng<R: Rng + ?Sized>(
        pool: impl IntoIterator<Item = QuestionRecord>,
        max_questions: usize,
        time_limit: Duration,
        rng: &mut R,
    ) -> Self {
        let mut questions: Vec<_> = pool.into_iter().filter(|q| q.has_answers()).collect();
        debug!("Loaded {} valid questions.", questions.len());

        questions.shuffle(rng);
        questions.truncate(max_questions);
        info!(
            "Selected {} questions for this session (time limit {:?}).",
            questions.len(),
            time_limit
        );

        QuizEngine {
            questions,
            answers: Vec::new(),
            time_limit,
            started: None,
        }
    }

    pub fn questions(&self) -> &[QuestionRecord] {
        &self.questions
    }

    pub fn answers(&self) -> &[UserAnswer] {
        &self.answers
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
        info!("Timer started.");
    }

    /// Time left; the full limit until the timer is started.
    pub fn remaining(&self) -> Duration {
        match self.started {
            Some(t) => self.time_limit.saturating_sub(t.elapsed()),
            None => self.time_limit,
        }
    }

    pub fn is_time_up(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn record_answer(&mut self, question: QuestionRecord, selected: Vec<String>) -> bool {
        let answer = UserAnswer { question, selected };
        let correct = answer.is_correct();
        info!(
            "Question ID: {} | User Selected: {:?} | Correct Answer: {:?} | Result: {}",
            answer.question.id,
            answer.selected,
            answer.question.correct_answers,
            if correct { "CORRECT" } else { "WRONG" }
        );
        self.answers.push(answer);
        correct
    }

    pub fn score(&self) -> Score {
        let total = self.answers.len();
        if total == 0 {
            return Score {
                correct: 0,
                total: 0,
                percentage: 0.0,
            };
        }
        let correct = self.answers.iter().filter(|a| a.is_correct()).count();
        Score {
            correct,
            total,
            percentage: correct as f64 / total as f64 * 100.0,
        }
    }

    /// Markdown study guide of the answered questions.
    pub fn render_report(&self, now: DateTime<Local>) -> String {
        let score = self.score();
        let mut md = String::new();

        md.push_str("# Quiz Session Report\n");
        let _ = writeln!(md, "**Date:** {}\n", now.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(
            md,
            "**Final Score:** {}/{} ({:.2}%)\n",
            score.correct, score.total, score.percentage
        );
        md.push_str("---\n\n");

        for (i, answer) in self.answers.iter().enumerate() {
            let q = &answer.question;
            let _ = writeln!(md, "## Question {} (ID: {})\n", i + 1, q.id);
            let _ = writeln!(md, "{}\n", q.text);

            md.push_str("### Options:\n");
            for (label, text) in &q.options {
                let marker = if q.correct_answers.contains(label) {
                    " **(Correct Answer)**"
                } else {
                    ""
                };
                let _ = writeln!(md, "- **{})** {}{}", label, text, marker);
            }

            let _ = writeln!(md, "\n**Your Answer:** {}", answer.selected.join(", "));
            let _ = writeln!(
                md,
                "**Result:** {}\n",
                if answer.is_correct() { "Correct" } else { "Incorrect" }
            );
            md.push_str("---\n\n");
        }
        md
    }

    /// Write `quiz_report_<YYYYMMDD_HHMMSS>.md` into `dir`.
    pub fn save_report(&self, dir: &Path) -> Result<PathBuf> {
        let now = Local::now();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("quiz_report_{}.md", now.format("%Y%m%d_%H%M%S")));
        fs::write(&path, self.render_report(now))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Study report saved to {}", path.display());
        Ok(path)
    }
}

/// Interactive loop: welcome screen, then one prompt per question until the
/// questions run out, the timer expires or input ends.
pub fn run_session<R: BufRead, W: Write>(
    engine: &mut QuizEngine,
    input: &mut R,
    out: &mut W,
) -> Result<SessionEnd> {
    let total = engine.questions().len();
    if !ui::show_welcome(input, out, total, engine.time_limit())? {
        return Ok(SessionEnd::Cancelled);
    }
    engine.start_timer();

    for i in 0..total {
        if engine.is_time_up() {
            warn!("Time limit reached during exam.");
            writeln!(out, "\n*** TIME IS UP! ***")?;
            return Ok(SessionEnd::TimeUp);
        }

        ui::show_header(out, i + 1, total, engine.remaining())?;
        let question = engine.questions()[i].clone();
        match ui::ask_question(input, out, &question)? {
            Some(selected) => {
                engine.record_answer(question, selected);
            }
            None => {
                warn!("Quiz input closed; session cancelled.");
                return Ok(SessionEnd::Cancelled);
            }
        }
    }

    Ok(SessionEnd::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    fn pool() -> Vec<QuestionRecord> {
        vec![
            sample("Question 1", &[("A", "one"), ("B", "two")], &["A"]),
            sample("Question 2", &[("A", "x"), ("B", "y"), ("C", "z")], &["A", "C"]),
            sample("Question 3", &[("A", "p"), ("B", "q")], &[]),
            sample("Question 4", &[("A", "m"), ("B", "n")], &["B"]),
        ]
    }

    fn engine(max: usize, limit: Duration) -> QuizEngine {
        QuizEngine::with_rng(pool(), max, limit, &mut StdRng::seed_from_u64(7))
    }

    fn answer(correct: &[&str], selected: &[&str]) -> UserAnswer {
        UserAnswer {
            question: sample("Question 9", &[("A", "a"), ("B", "b"), ("C", "c")], correct),
            selected: selected.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn scoring_is_exact_set_match() {
        assert!(answer(&["A", "C"], &["C", "A"]).is_correct());
        assert!(!answer(&["A", "C"], &["A"]).is_correct());
        assert!(!answer(&["A", "C"], &["A", "B", "C"]).is_correct());
        assert!(answer(&["B"], &["B"]).is_correct());
        assert!(!answer(&["B"], &[]).is_correct());
    }

    #[test]
    fn answerless_questions_are_excluded() {
        let e = engine(10, Duration::from_secs(60));
        assert_eq!(e.questions().len(), 3);
        assert!(e.questions().iter().all(|q| q.id != "Question 3"));
    }

    #[test]
    fn sample_is_capped() {
        let e = engine(2, Duration::from_secs(60));
        assert_eq!(e.questions().len(), 2);
        assert!(e.questions().iter().all(|q| q.has_answers()));
    }

    #[test]
    fn empty_score() {
        let e = engine(10, Duration::from_secs(60));
        assert_eq!(
            e.score(),
            Score {
                correct: 0,
                total: 0,
                percentage: 0.0
            }
        );
    }

    #[test]
    fn score_counts_answers() {
        let mut e = engine(10, Duration::from_secs(60));
        let qs = e.questions().to_vec();
        for q in qs {
            let selected = if q.id == "Question 2" {
                vec!["A".to_string()]
            } else {
                q.correct_answers.clone()
            };
            e.record_answer(q, selected);
        }
        let score = e.score();
        assert_eq!((score.correct, score.total), (2, 3));
        assert!((score.percentage - 66.666).abs() < 0.01);
    }

    #[test]
    fn timer_runs_out() {
        let mut e = engine(10, Duration::ZERO);
        assert!(e.is_time_up());
        let mut e2 = engine(10, Duration::from_secs(600));
        e2.start_timer();
        assert!(!e2.is_time_up());
        assert!(e2.remaining() <= Duration::from_secs(600));
        e.start_timer();
        assert_eq!(e.remaining(), Duration::ZERO);
    }

    #[test]
    fn report_layout() {
        let mut e = QuizEngine::new(Vec::new(), 10, Duration::from_secs(60));
        e.record_answer(
            sample("Question 2", &[("A", "x"), ("B", "y"), ("C", "z")], &["A", "C"]),
            vec!["C".into(), "A".into()],
        );
        e.record_answer(sample("Question 5", &[("A", "m"), ("B", "n")], &["B"]), vec!["A".into()]);

        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let md = e.render_report(now);

        assert!(md.starts_with("# Quiz Session Report\n**Date:** 2024-03-09 14:05:07\n\n"));
        assert!(md.contains("**Final Score:** 1/2 (50.00%)\n"));
        assert!(md.contains("## Question 1 (ID: Question 2)\n\nPrompt for Question 2\n\n"));
        assert!(md.contains("- **A)** x **(Correct Answer)**\n- **B)** y\n- **C)** z **(Correct Answer)**\n"));
        assert!(md.contains("**Your Answer:** C, A\n**Result:** Correct\n"));
        assert!(md.contains("## Question 2 (ID: Question 5)"));
        assert!(md.contains("**Your Answer:** A\n**Result:** Incorrect\n"));
    }

    #[test]
    fn report_is_written_to_reports_dir() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let mut e = engine(1, Duration::from_secs(60));
        let q = e.questions()[0].clone();
        let selected = q.correct_answers.clone();
        e.record_answer(q, selected);

        let path = e.save_report(&reports).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("quiz_report_") && name.ends_with(".md"));
        assert_eq!(name.len(), "quiz_report_20240309_140507.md".len());
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("**Final Score:** 1/1 (100.00%)"));
    }

    #[test]
    fn session_answers_every_question() {
        let mut e = engine(10, Duration::from_secs(600));
        let script: String = std::iter::once("\n".to_string())
            .chain(e.questions().iter().map(|q| format!("{}\n", q.correct_answers.join(","))))
            .collect();
        let mut out = Vec::new();

        let end = run_session(&mut e, &mut Cursor::new(script), &mut out).unwrap();

        assert_eq!(end, SessionEnd::Completed);
        assert_eq!(e.score().correct, 3);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Question 1/3"));
        assert!(shown.contains("Question 3/3"));
    }

    #[test]
    fn session_stops_when_time_is_up() {
        let mut e = engine(10, Duration::ZERO);
        let mut out = Vec::new();

        let end = run_session(&mut e, &mut Cursor::new("\nA\n"), &mut out).unwrap();

        assert_eq!(end, SessionEnd::TimeUp);
        assert!(e.answers().is_empty());
        assert!(String::from_utf8(out).unwrap().contains("TIME IS UP"));
    }

    #[test]
    fn closed_input_cancels() {
        let mut e = engine(10, Duration::from_secs(600));
        let first = e.questions()[0].correct_answers.join(" ");
        let mut out = Vec::new();

        let end = run_session(&mut e, &mut Cursor::new(format!("\n{}\n", first)), &mut out).unwrap();

        assert_eq!(end, SessionEnd::Cancelled);
        assert_eq!(e.answers().len(), 1);
    }
}
