use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{oneshot, Notify};
use tracing::{error, info, warn};

use crate::browser::Navigator;
use crate::model::{merge_records, QuestionMap};
use crate::parser::{PageExtraction, PageExtractor, QuestionRange};
use crate::storage::{self, QuestionStore};

/// Blocking hand-off to a human (login wall, CAPTCHA). Resolves once the
/// operator says the page is usable again; there is no timeout.
#[allow(async_fn_in_trait)]
pub trait Intervention {
    async fn await_resume(&mut self) -> Result<()>;
}

/// Rings the terminal bell and waits for ENTER.
pub struct ConsoleIntervention;

impl Intervention for ConsoleIntervention {
    async fn await_resume(&mut self) -> Result<()> {
        let banner = "=".repeat(60);
        println!("\x07");
        println!("\n{}", banner);
        println!("PAUSED: LOGIN REQUIRED OR CAPTCHA");
        println!("1. Go to the Chrome window.");
        println!("2. Log in / solve the CAPTCHA.");
        println!("3. Make sure the questions are visible.");
        println!("4. Press ENTER here to resume.");
        println!("{}\n", banner);
        print!("Press ENTER to resume scraping...");
        let _ = std::io::stdout().flush();

        // A plain thread so a pending read never holds up process exit.
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = tx.send(std::io::stdin().read_line(&mut line));
        });

        match rx.await {
            Ok(Ok(0)) => bail!("stdin closed while waiting for manual intervention"),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e).context("Failed to read from stdin"),
            Err(_) => bail!("stdin reader went away"),
        }
    }
}

/// Cooperative stop signal, checked between pages.
#[derive(Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that trips on the first Ctrl+C.
    pub fn on_ctrl_c() -> Self {
        let cancel = Self::new();
        let trip = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Scraper stopped by user.");
                trip.cancel();
            }
        });
        cancel
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub start_url: String,
    pub range: QuestionRange,
    pub output: PathBuf,
    pub page_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A question past the range end was reached.
    LimitReached,
    /// No usable "next" control.
    NoNextPage,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub pages: usize,
    pub merged: usize,
    pub total: usize,
    pub stop: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Loading,
    /// `resumed` is set for the single re-extraction after an intervention.
    Extracting { resumed: bool },
    AwaitingIntervention,
    Paginating,
    Done(StopReason),
}

/// Pagination loop tying navigator, extractor and store together.
pub struct Orchestrator {
    store: Box<dyn QuestionStore>,
    extractor: PageExtractor,
    job: ScrapeJob,
    master: QuestionMap,
    merged: usize,
}

impl Orchestrator {
    /// Back up the dataset file and load what is already known.
    pub fn initialize(store: Box<dyn QuestionStore>, extractor: PageExtractor, job: ScrapeJob) -> Self {
        if let Err(e) = storage::create_backup(&job.output) {
            error!("Failed to create backup: {}", e);
        }
        let master = store.load_existing(&job.output);
        info!("Loaded {} existing questions.", master.len());

        Orchestrator {
            store,
            extractor,
            job,
            master,
            merged: 0,
        }
    }

    /// Run the scrape to completion. The navigator is always closed, however
    /// the loop ends.
    pub async fn run<N: Navigator, I: Intervention>(
        &mut self,
        mut navigator: N,
        intervention: &mut I,
        cancel: &CancelFlag,
    ) -> Result<ScrapeSummary> {
        let result = self.drive(&mut navigator, intervention, cancel).await;
        info!("Closing browser...");
        navigator.close().await;
        result
    }

    async fn drive<N: Navigator, I: Intervention>(
        &mut self,
        navigator: &mut N,
        intervention: &mut I,
        cancel: &CancelFlag,
    ) -> Result<ScrapeSummary> {
        let mut page_num = 1;
        let mut state = State::Loading;

        loop {
            state = match state {
                State::Loading => {
                    navigator
                        .load(&self.job.start_url)
                        .await
                        .with_context(|| format!("Failed to load {}", self.job.start_url))?;
                    State::Extracting { resumed: false }
                }

                State::Extracting { resumed } => {
                    if !resumed && cancel.is_cancelled() {
                        State::Done(StopReason::Cancelled)
                    } else {
                        if !resumed {
                            info!("--- Processing page {} ---", page_num);
                        }
                        let page = self.extract_page(navigator).await?;
                        if page.max_id_seen == 0 && !resumed {
                            warn!("No questions visible on page {}. Possible login wall.", page_num);
                            State::AwaitingIntervention
                        } else if self.accept(page_num, page)? {
                            info!("Reached end limit (question {:?}). Stopping.", self.job.range.end);
                            State::Done(StopReason::LimitReached)
                        } else {
                            State::Paginating
                        }
                    }
                }

                State::AwaitingIntervention => {
                    tokio::select! {
                        resumed = intervention.await_resume() => {
                            resumed?;
                            info!("Resuming...");
                            State::Extracting { resumed: true }
                        }
                        _ = cancel.cancelled() => State::Done(StopReason::Cancelled),
                    }
                }

                State::Paginating => {
                    if cancel.is_cancelled() {
                        State::Done(StopReason::Cancelled)
                    } else if !navigator.advance_page().await {
                        info!("No more pages found. Scrape complete.");
                        State::Done(StopReason::NoNextPage)
                    } else {
                        // A page only counts once the delay has run out uncancelled.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => State::Done(StopReason::Cancelled),
                            _ = tokio::time::sleep(self.job.page_delay) => {
                                page_num += 1;
                                State::Extracting { resumed: false }
                            }
                        }
                    }
                }

                State::Done(stop) => {
                    return Ok(ScrapeSummary {
                        pages: page_num,
                        merged: self.merged,
                        total: self.master.len(),
                        stop,
                    });
                }
            };
        }
    }

    async fn extract_page<N: Navigator>(&self, navigator: &mut N) -> Result<PageExtraction> {
        navigator.reveal_answers().await;
        let html = navigator
            .snapshot()
            .await
            .context("Failed to read the rendered page")?;
        Ok(self.extractor.extract(&html, self.job.range))
    }

    /// Merge a page into the master map and persist it. Returns whether the
    /// range limit was hit on this page.
    fn accept(&mut self, page_num: usize, page: PageExtraction) -> Result<bool> {
        let count = page.records.len();
        if count > 0 {
            info!("Extracted {} relevant questions.", count);
            self.merged += merge_records(&mut self.master, page.records);
            self.store
                .save(&self.master, &self.job.output)
                .with_context(|| format!("Failed to save {}", self.job.output.display()))?;
        } else if page.max_id_seen > 0 {
            info!("Page {} scanned. No questions within target range.", page_num);
        }
        Ok(page.limit_reached)
    }
}
