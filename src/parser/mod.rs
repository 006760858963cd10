pub mod text;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::config::SiteProfile;
use crate::model::{question_number, QuestionRecord};
use text::{first_line, inner_text};

/// Optional inclusive window of question numbers to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestionRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl QuestionRange {
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        QuestionRange { start, end }
    }

    fn is_before_start(&self, n: u64) -> bool {
        self.start.is_some_and(|s| n < s)
    }

    fn is_past_end(&self, n: u64) -> bool {
        self.end.is_some_and(|e| n > e)
    }
}

/// Result of scanning one rendered page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub records: Vec<QuestionRecord>,
    /// A container past the range end was seen; scanning stopped there.
    pub limit_reached: bool,
    /// Highest question number among all parsed containers, in range or not.
    /// Zero means nothing recognisable was on the page.
    pub max_id_seen: u64,
}

struct Selectors {
    container: Selector,
    title: Selector,
    panel: Selector,
    question_text: Selector,
    options_list: Selector,
    option_label: Selector,
    option_text: Selector,
}

/// Turns a rendered exam page into question records.
pub struct PageExtractor {
    sel: Selectors,
    correct_class: String,
    correct_colors: Vec<String>,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {:?}", css, e))
}

impl PageExtractor {
    pub fn new(profile: &SiteProfile) -> Result<Self> {
        Ok(PageExtractor {
            sel: Selectors {
                container: selector(&profile.container)?,
                title: selector(&profile.container_title)?,
                panel: selector(&profile.panel)?,
                question_text: selector(&profile.question_text)?,
                options_list: selector(&profile.options_list)?,
                option_label: selector(&profile.option_label)?,
                option_text: selector(&profile.option_text)?,
            },
            correct_class: profile.correct_class.clone(),
            correct_colors: profile.correct_colors.clone(),
        })
    }

    /// Scan containers in document order. Assumes ascending question numbers:
    /// the first container past `range.end` stops the scan, so anything after
    /// it on the same page is not looked at.
    pub fn extract(&self, html: &str, range: QuestionRange) -> PageExtraction {
        let doc = Html::parse_document(html);
        let mut out = PageExtraction::default();

        let containers: Vec<_> = doc.select(&self.sel.container).collect();
        if containers.is_empty() {
            debug!("No question containers found in DOM.");
        }

        for (i, container) in containers.into_iter().enumerate() {
            let Some(record) = self.parse_container(container, i + 1) else {
                continue;
            };

            let n = question_number(&record.id);
            out.max_id_seen = out.max_id_seen.max(n);

            if range.is_past_end(n) {
                info!("Reached question {}. Exceeds limit {:?}.", n, range.end);
                out.limit_reached = true;
                break;
            }
            if range.is_before_start(n) {
                continue;
            }
            out.records.push(record);
        }

        out
    }

    fn parse_container(&self, container: ElementRef, index: usize) -> Option<QuestionRecord> {
        let id = container
            .select(&self.sel.title)
            .next()
            .map(first_line)
            .unwrap_or_else(|| format!("Unknown_Q_{}", index));

        let Some(panel) = container.select(&self.sel.panel).next() else {
            warn!("[{}] No answer panel found.", id);
            return None;
        };
        let Some(text_el) = panel.select(&self.sel.question_text).next() else {
            warn!("[{}] Could not find question text.", id);
            return None;
        };
        let Some(options_el) = panel.select(&self.sel.options_list).next() else {
            warn!("[{}] No options container found.", id);
            return None;
        };

        let mut options = IndexMap::new();
        let mut correct_answers = Vec::new();

        let rows = options_el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|row| row.value().name() == "div");

        for row in rows {
            let Some((label, value)) = self.parse_option(row) else {
                continue;
            };
            if self.is_marked_correct(row) && !correct_answers.contains(&label) {
                correct_answers.push(label.clone());
            }
            options.insert(label, value);
        }

        Some(QuestionRecord {
            id,
            text: inner_text(text_el),
            options,
            correct_answers,
        })
    }

    fn parse_option(&self, row: ElementRef) -> Option<(String, String)> {
        let label = row.select(&self.sel.option_label).next()?;
        let value = row.select(&self.sel.option_text).next()?;
        let label = inner_text(label).replace('.', "").trim().to_string();
        Some((label, inner_text(value)))
    }

    /// Correctness comes from presentation state: a marker class, or a green
    /// border colour stamped on the row (`data-border-color`) or inline style.
    fn is_marked_correct(&self, row: ElementRef) -> bool {
        let el = row.value();
        if el
            .attr("class")
            .is_some_and(|c| c.contains(&self.correct_class))
        {
            return true;
        }
        [el.attr("data-border-color"), el.attr("style")]
            .into_iter()
            .flatten()
            .any(|v| self.correct_colors.iter().any(|c| v.contains(c.as_str())))
    }
}

#[cfg(test)]
pub(crate) fn synthetic_page(numbers: impl IntoIterator<Item = u64>) -> String {
    let items: String = numbers
        .into_iter()
        .map(|n| {
            format!(
                r#"<div class="chakra-accordion__item">
  <button class="chakra-accordion__button"><div>Question {n}</div></button>
  <div class="chakra-accordion__panel">
    <div class="css-naa3lg">Prompt {n}</div>
    <div class="css-j7qwjs">
      <div class="css-jjzrip"><p class="css-xakj1w">A.</p><div class="css-cba290">Right {n}</div></div>
      <div><p class="css-xakj1w">B.</p><div class="css-cba290">Wrong {n}</div></div>
    </div>
  </div>
</div>"#
            )
        })
        .collect();
    format!(
        "<html><body><div class=\"chakra-accordion\">{}</div></body></html>",
        items
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PageExtractor {
        PageExtractor::new(&SiteProfile::default()).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn ids(page: &PageExtraction) -> Vec<u64> {
        page.records.iter().map(|r| r.number()).collect()
    }

    #[test]
    fn exam_page_fixture() {
        let page = extractor().extract(&fixture("exam_page"), QuestionRange::default());
        assert!(!page.limit_reached);
        // Question 23 has no prompt and is skipped without counting.
        assert_eq!(ids(&page), vec![21, 22, 24]);
        assert_eq!(page.max_id_seen, 24);

        let q21 = &page.records[0];
        assert_eq!(q21.id, "Question 21");
        assert_eq!(
            q21.text,
            "A company runs a stateless web tier behind a load balancer.\nWhich service reduces latency for global users?"
        );
        let labels: Vec<_> = q21.options.keys().map(String::as_str).collect();
        assert_eq!(labels, ["A", "B", "C"]);
        assert_eq!(q21.options["B"], "Cloud Armor & global load balancing");
        assert_eq!(q21.correct_answers, vec!["B"]);
        assert!(!q21.is_multiple_choice());
    }

    #[test]
    fn multi_select_and_malformed_rows() {
        let page = extractor().extract(&fixture("exam_page"), QuestionRange::default());
        let q22 = &page.records[1];
        assert_eq!(q22.text, "Select TWO options that lower storage cost.\nChoose carefully.");
        assert_eq!(q22.options.len(), 3);
        assert_eq!(q22.correct_answers, vec!["A", "C"]);
        assert!(q22.is_multiple_choice());

        let q24 = &page.records[2];
        assert!(q24.correct_answers.is_empty());
        assert_eq!(q24.options.len(), 2);
    }

    #[test]
    fn login_wall_has_nothing() {
        let page = extractor().extract(&fixture("login_wall"), QuestionRange::default());
        assert!(page.records.is_empty());
        assert_eq!(page.max_id_seen, 0);
        assert!(!page.limit_reached);
    }

    #[test]
    fn range_filters_inclusive() {
        let html = synthetic_page(1..=10);
        let page = extractor().extract(&html, QuestionRange::new(Some(3), Some(8)));
        assert_eq!(ids(&page), vec![3, 4, 5, 6, 7, 8]);
        assert!(page.limit_reached);
        assert_eq!(page.max_id_seen, 9);
    }

    #[test]
    fn open_bounds() {
        let html = synthetic_page(1..=6);
        let ex = extractor();

        let all = ex.extract(&html, QuestionRange::default());
        assert_eq!(ids(&all), (1..=6).collect::<Vec<_>>());
        assert!(!all.limit_reached);

        let from = ex.extract(&html, QuestionRange::new(Some(5), None));
        assert_eq!(ids(&from), vec![5, 6]);
        assert_eq!(from.max_id_seen, 6);

        let until = ex.extract(&html, QuestionRange::new(None, Some(6)));
        assert_eq!(ids(&until), (1..=6).collect::<Vec<_>>());
        assert!(!until.limit_reached);
    }

    #[test]
    fn everything_below_start_still_counts_as_seen() {
        let html = synthetic_page(1..=5);
        let page = extractor().extract(&html, QuestionRange::new(Some(50), None));
        assert!(page.records.is_empty());
        assert_eq!(page.max_id_seen, 5);
    }

    #[test]
    fn stops_at_first_out_of_range_even_if_unordered() {
        let html = synthetic_page([4, 12, 5]);
        let page = extractor().extract(&html, QuestionRange::new(None, Some(10)));
        assert_eq!(ids(&page), vec![4]);
        assert!(page.limit_reached);
        assert_eq!(page.max_id_seen, 12);
    }

    #[test]
    fn missing_title_gets_placeholder_id() {
        let html = synthetic_page([1]).replace("chakra-accordion__button", "plain-button");
        let page = extractor().extract(&html, QuestionRange::default());
        assert_eq!(page.records[0].id, "Unknown_Q_1");
        assert_eq!(page.max_id_seen, 1);
    }

    #[test]
    fn bad_selector_is_an_error() {
        let profile = SiteProfile {
            container: "div[".into(),
            ..SiteProfile::default()
        };
        assert!(PageExtractor::new(&profile).is_err());
    }
}
