use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::model::{QuestionMap, QuestionRecord};
use crate::storage::store_for_path;

pub const DEFAULT_TITLE: &str = "Exam Dump Export";

pub fn render_header(title: &str, total: usize, now: DateTime<Local>) -> String {
    format!(
        "# {}\n\n**Total Questions:** {}\n**Generated:** {}\n\n---\n\n",
        title,
        total,
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// One question block: heading, prompt, options sorted by label, then the
/// answer key when one is known.
pub fn render_question(q: &QuestionRecord) -> String {
    let mut lines = vec![format!("### {}\n", q.id), format!("{}\n", q.text.replace('\n', "\n\n"))];

    let mut labels: Vec<&String> = q.options.keys().collect();
    labels.sort();
    lines.extend(labels.into_iter().map(|l| format!("- {}) {}", l, q.options[l])));

    let correct: BTreeSet<&str> = q.correct_answers.iter().map(String::as_str).collect();
    if !correct.is_empty() {
        let joined: Vec<&str> = correct.into_iter().collect();
        lines.push(format!("\n> **Correct Answer:** {}", joined.join(", ")));
    }

    lines.push("\n---\n".to_string());
    lines.join("\n")
}

pub fn render_document(
    title: &str,
    questions: &QuestionMap,
    now: DateTime<Local>,
    pb: &ProgressBar,
) -> String {
    let mut doc = render_header(title, questions.len(), now);
    for q in questions.values() {
        doc.push_str(&render_question(q));
        pb.inc(1);
    }
    doc
}

/// Read a dataset file (format from its extension) and write it as one
/// Markdown document. Returns the number of questions exported.
pub fn convert(input: &Path, output: &Path, title: &str) -> Result<usize> {
    info!("Starting Markdown converter...");
    let questions = store_for_path(input)
        .load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    info!("Loaded {} questions from {}", questions.len(), input.display());

    let pb = ProgressBar::new(questions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    let doc = render_document(title, &questions, Local::now(), &pb);
    pb.finish_and_clear();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(output, doc).with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Exported to {}", output.display());
    Ok(questions.len())
}
