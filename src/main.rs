mod browser;
mod config;
mod convert;
mod error;
mod logging;
mod model;
mod orchestrator;
mod parser;
mod quiz;
mod storage;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use browser::ChromeNavigator;
use config::{Settings, SiteProfile};
use logging::LogTarget;
use orchestrator::{CancelFlag, ConsoleIntervention, Orchestrator, ScrapeJob, StopReason};
use parser::{PageExtractor, QuestionRange};
use quiz::{QuizEngine, SessionEnd};

#[derive(Parser)]
#[command(name = "exam_scraper", about = "Exam question scraper, quiz runner and Markdown exporter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape exam pages into the dataset file (merges with existing data)
    Scrape {
        /// First exam page (overrides START_URL)
        #[arg(long)]
        url: Option<String>,
        /// First question number to keep
        #[arg(long)]
        start: Option<u64>,
        /// Last question number to keep; the scrape stops past it
        #[arg(long)]
        end: Option<u64>,
        /// Dataset format: json, csv or yaml
        #[arg(short, long)]
        format: Option<String>,
        /// Dataset file (default: output/<exam>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run Chrome without a window
        #[arg(long)]
        headless: bool,
    },
    /// Timed practice quiz over scraped questions
    Quiz {
        /// Dataset file (default: EXAM_QUESTIONS_FILE)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Max questions in the session
        #[arg(short = 'n', long)]
        max_questions: Option<usize>,
        /// Time limit in minutes
        #[arg(short, long)]
        minutes: Option<u64>,
    },
    /// Export a dataset file as a single Markdown document
    Convert {
        /// Dataset file (default: EXAM_QUESTIONS_FILE)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Markdown output (default: EXPORT_FILE)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Document title
        #[arg(short, long, default_value = convert::DEFAULT_TITLE)]
        title: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    let target = match cli.command {
        Commands::Scrape { .. } => LogTarget::Scrape,
        Commands::Quiz { .. } => LogTarget::Quiz,
        Commands::Convert { .. } => LogTarget::Convert,
    };
    let _log_guard = logging::init(target, &settings.logs_dir)?;

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Scrape {
            url,
            start,
            end,
            format,
            output,
            headless,
        } => {
            if let Some(url) = url {
                settings.start_url = url;
            }
            if start.is_some() {
                settings.question_range_start = start;
            }
            if end.is_some() {
                settings.question_range_end = end;
            }
            if let Some(format) = format {
                settings.output_format = format;
            }
            if output.is_some() {
                settings.output_file = output;
            }
            settings.headless |= headless;

            let store = storage::store_named(&settings.output_format)?;
            let profile = SiteProfile::default();
            let extractor = PageExtractor::new(&profile)?;
            let job = ScrapeJob {
                start_url: settings.start_url.clone(),
                range: QuestionRange::new(settings.question_range_start, settings.question_range_end),
                output: settings.output_path()?,
                page_delay: settings.page_delay(),
            };
            println!(
                "Scraping {} (questions {} to {}) into {}",
                job.start_url,
                bound(job.range.start),
                bound(job.range.end),
                job.output.display()
            );

            let mut orchestrator = Orchestrator::initialize(store, extractor, job);
            let cancel = CancelFlag::on_ctrl_c();
            let navigator = ChromeNavigator::launch(profile, settings.headless, settings.load_timeout())
                .await
                .context("Failed to start browser")?;

            let summary = orchestrator
                .run(navigator, &mut ConsoleIntervention, &cancel)
                .await?;
            let why = match summary.stop {
                StopReason::LimitReached => "range end reached",
                StopReason::NoNextPage => "no more pages",
                StopReason::Cancelled => "cancelled by user",
            };
            println!(
                "Done ({}): {} pages, {} questions merged, {} total saved.",
                why, summary.pages, summary.merged, summary.total
            );
            Ok(())
        }
        Commands::Quiz {
            file,
            max_questions,
            minutes,
        } => {
            let path = file.unwrap_or_else(|| settings.exam_questions_file.clone());
            let questions = storage::store_for_path(&path)
                .load(&path)
                .with_context(|| format!("Error loading exam from {}", path.display()))?;
            let time_limit = minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or_else(|| settings.quiz_time_limit());

            let mut engine = QuizEngine::new(
                questions.into_values(),
                max_questions.unwrap_or(settings.exam_max_questions),
                time_limit,
            );
            if engine.questions().is_empty() {
                println!("No questions with known answers in {}.", path.display());
                return Ok(());
            }

            let mut input = io::stdin().lock();
            let mut out = io::stdout();
            match quiz::run_session(&mut engine, &mut input, &mut out)? {
                SessionEnd::Cancelled => {
                    println!("\nQuiz cancelled by user.");
                    return Ok(());
                }
                SessionEnd::Completed | SessionEnd::TimeUp => {}
            }

            quiz::ui::show_results(&mut out, engine.score(), engine.answers())?;
            match engine.save_report(&settings.reports_dir) {
                Ok(report) => println!("\nStudy guide saved to: {}", report.display()),
                Err(e) => {
                    error!("Failed to save report: {:#}", e);
                    println!("\nFailed to save study guide: {:#}", e);
                }
            }
            Ok(())
        }
        Commands::Convert { file, out, title } => {
            let input = file.unwrap_or_else(|| settings.exam_questions_file.clone());
            let output = out.unwrap_or_else(|| settings.export_file.clone());
            let count = convert::convert(&input, &output, &title)?;
            println!("Exported {} questions to {}", count, output.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn bound(n: Option<u64>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
