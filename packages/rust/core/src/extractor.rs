//! Field-by-field fact extraction over normalized pages.
//!
//! Every field of [`ExtractionResult`] is a separate structured-output call
//! against the [`LlmBackend`]. Pages are numbered in the prompt and the model
//! cites them by number; numbers are mapped back to page URLs here.
//!
//! Failures are graded: a one-off provider or parse error empties only the
//! affected field, while a systemic error aborts the whole extraction.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use contextpack_llm::{LlmBackend, LlmPrompt};
use contextpack_normalizer::normalize;
use contextpack_shared::{
    Citation, ConfidentField, ContextPackError, ExtractionResult, IcpSegment, PageKind, Result,
    ScrapeResult,
};

use crate::progress::ScanProgress;

/// Reason carried by every field when there was nothing to read.
pub const NO_PAGES_REASON: &str = "no page content available";

const NOT_STATED_REASON: &str = "not stated on the scanned pages";
const STATED_REASON: &str = "stated on the scanned pages";
const MAX_LIST_ITEMS: usize = 8;
const MAX_EXCERPT_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You extract facts about a company from its own public web pages. \
Answer only from the numbered pages provided and never from prior knowledge. \
If the pages do not state the answer, set found to false (or return no items) with confidence 0. \
Confidence is your estimate between 0 and 1 that the answer is explicitly supported by the pages. \
List the numbers of the pages you used in sources and quote a short supporting excerpt.";

// ---------------------------------------------------------------------------
// Input pages
// ---------------------------------------------------------------------------

/// A fetched page after normalization, as offered to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub url: String,
    pub kind: PageKind,
    pub title: Option<String>,
    pub text: String,
}

/// Normalize every successful page, dropping pages with no static text.
pub fn prepare_pages(scrape: &ScrapeResult, max_chars: usize) -> Vec<SourcePage> {
    scrape
        .successful_pages()
        .filter_map(|page| {
            let normalized = normalize(&page.content, max_chars);
            if normalized.is_empty() {
                debug!(url = %page.url, "page has no static text");
                return None;
            }
            if normalized.truncated {
                debug!(url = %page.url, max_chars, "page text truncated");
            }
            Some(SourcePage {
                url: page.url.clone(),
                kind: page.kind,
                title: normalized.title,
                text: normalized.text,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Field tasks
// ---------------------------------------------------------------------------

/// One extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTask {
    Vision,
    Mission,
    Values,
    IcpSegments,
    RevenueDrivers,
    PricingModel,
    JobsToBeDone,
    KeyFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Fact,
    List,
    Segments,
}

impl FieldTask {
    pub const ALL: [FieldTask; 8] = [
        Self::Vision,
        Self::Mission,
        Self::Values,
        Self::IcpSegments,
        Self::RevenueDrivers,
        Self::PricingModel,
        Self::JobsToBeDone,
        Self::KeyFeatures,
    ];

    /// Schema name and log key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::Mission => "mission",
            Self::Values => "values",
            Self::IcpSegments => "icpSegments",
            Self::RevenueDrivers => "revenueDrivers",
            Self::PricingModel => "pricingModel",
            Self::JobsToBeDone => "jobsToBeDone",
            Self::KeyFeatures => "keyFeatures",
        }
    }

    fn shape(&self) -> Shape {
        match self {
            Self::Vision | Self::Mission | Self::PricingModel => Shape::Fact,
            Self::IcpSegments => Shape::Segments,
            Self::Values | Self::RevenueDrivers | Self::JobsToBeDone | Self::KeyFeatures => {
                Shape::List
            }
        }
    }

    fn question(&self) -> &'static str {
        match self {
            Self::Vision => {
                "What long-term future does the company want to bring about? Answer with its vision in one sentence."
            }
            Self::Mission => "What is the company's stated mission? Answer in one sentence.",
            Self::Values => {
                "Which values or cultural principles does the company state? List each value as a short phrase."
            }
            Self::IcpSegments => {
                "Which types of customers is the product built for? List each segment with a short name and a one-sentence description."
            }
            Self::RevenueDrivers => {
                "How does the company make money? List each revenue source as a short phrase."
            }
            Self::PricingModel => {
                "What is the pricing model, for example per-seat subscription or usage-based? Answer in one sentence."
            }
            Self::JobsToBeDone => {
                "What jobs do customers hire the product to do? List each as a short outcome-focused phrase."
            }
            Self::KeyFeatures => "What are the product's key features? List each as a short phrase.",
        }
    }

    /// Page kinds offered for this field, in prompt order.
    fn preferred_kinds(&self) -> &'static [PageKind] {
        match self {
            Self::Vision | Self::Mission => &[PageKind::About, PageKind::Home],
            Self::Values => &[PageKind::About, PageKind::Careers, PageKind::Home],
            Self::IcpSegments
            | Self::RevenueDrivers
            | Self::PricingModel
            | Self::JobsToBeDone
            | Self::KeyFeatures => &[PageKind::Home, PageKind::About],
        }
    }

    /// JSON schema for the structured answer.
    pub fn schema(&self) -> Value {
        let fact = |content_key: &str| {
            let mut props = serde_json::Map::new();
            props.insert(content_key.into(), json!({"type": "string"}));
            props.insert(
                "confidence".into(),
                json!({"type": "number", "minimum": 0, "maximum": 1}),
            );
            props.insert("reason".into(), json!({"type": "string"}));
            props.insert(
                "sources".into(),
                json!({"type": "array", "items": {"type": "integer"}}),
            );
            props.insert("excerpt".into(), json!({"type": "string"}));
            props
        };
        let object = |props: serde_json::Map<String, Value>| {
            let required: Vec<String> = props.keys().cloned().collect();
            json!({
                "type": "object",
                "properties": props,
                "required": required,
                "additionalProperties": false,
            })
        };

        match self.shape() {
            Shape::Fact => {
                let mut props = fact("content");
                props.insert("found".into(), json!({"type": "boolean"}));
                object(props)
            }
            Shape::List => {
                let mut props = serde_json::Map::new();
                props.insert(
                    "items".into(),
                    json!({"type": "array", "items": object(fact("content"))}),
                );
                object(props)
            }
            Shape::Segments => {
                let mut segment = fact("description");
                segment.insert("name".into(), json!({"type": "string"}));
                let mut props = serde_json::Map::new();
                props.insert(
                    "segments".into(),
                    json!({"type": "array", "items": object(segment)}),
                );
                object(props)
            }
        }
    }
}

/// Pages offered for `task`, falling back to every page when none of the
/// preferred kinds were fetched.
fn select_pages(task: FieldTask, pages: &[SourcePage]) -> Vec<&SourcePage> {
    let selected: Vec<&SourcePage> = task
        .preferred_kinds()
        .iter()
        .flat_map(|kind| pages.iter().filter(move |p| p.kind == *kind))
        .collect();

    if selected.is_empty() {
        pages.iter().collect()
    } else {
        selected
    }
}

fn build_prompt(task: FieldTask, offered: &[&SourcePage]) -> LlmPrompt {
    let mut user = format!("Question: {}\n\nPages:\n\n", task.question());
    for (i, page) in offered.iter().enumerate() {
        let _ = writeln!(user, "[{}] {} ({} page)", i + 1, page.url, page.kind.as_str());
        if let Some(title) = &page.title {
            let _ = writeln!(user, "Title: {title}");
        }
        user.push_str(&page.text);
        user.push_str("\n\n");
    }
    LlmPrompt::new(task.key(), SYSTEM_PROMPT, user.trim_end())
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FactAnswer {
    found: Option<bool>,
    content: String,
    confidence: f64,
    reason: String,
    sources: Vec<f64>,
    excerpt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListAnswer {
    items: Vec<FactAnswer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SegmentAnswer {
    name: String,
    description: String,
    confidence: f64,
    reason: String,
    sources: Vec<f64>,
    excerpt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SegmentsAnswer {
    segments: Vec<SegmentAnswer>,
}

impl SegmentAnswer {
    fn into_segment(self, offered: &[&SourcePage]) -> Option<IcpSegment> {
        let name = self.name.trim().to_string();
        let description = FactAnswer {
            found: None,
            content: self.description,
            confidence: self.confidence,
            reason: self.reason,
            sources: self.sources,
            excerpt: self.excerpt,
        }
        .into_field(offered);
        (!name.is_empty() && description.is_extracted()).then_some(IcpSegment { name, description })
    }
}

impl FactAnswer {
    fn into_field(self, offered: &[&SourcePage]) -> ConfidentField<String> {
        let reason = self.reason.trim();
        let content = self.content.trim();
        if self.found == Some(false) || content.is_empty() || !(self.confidence > 0.0) {
            let reason = if reason.is_empty() { NOT_STATED_REASON } else { reason };
            return ConfidentField::empty(reason);
        }

        let reason = if reason.is_empty() { STATED_REASON } else { reason };
        let citations = cite(offered, &self.sources, &self.excerpt);
        ConfidentField::new(content.to_string(), self.confidence, reason, citations)
    }
}

/// Map 1-based page numbers onto citations. Unknown numbers are dropped; if
/// nothing valid remains, every offered page is cited.
fn cite(offered: &[&SourcePage], sources: &[f64], excerpt: &str) -> Vec<Citation> {
    let mut indices: Vec<usize> = Vec::new();
    for &n in sources {
        if n.fract() != 0.0 || n < 1.0 {
            continue;
        }
        let idx = n as usize - 1;
        if idx < offered.len() && !indices.contains(&idx) {
            indices.push(idx);
        }
    }
    if indices.is_empty() {
        indices = (0..offered.len()).collect();
    }

    let excerpt = clip(excerpt.trim(), MAX_EXCERPT_CHARS);
    indices
        .into_iter()
        .enumerate()
        .map(|(pos, idx)| {
            let citation = Citation::page(&offered[idx].url);
            if pos == 0 {
                citation.with_excerpt(excerpt.clone())
            } else {
                citation
            }
        })
        .collect()
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Extracted items, deduplicated case-insensitively and capped.
fn collect_items(items: Vec<FactAnswer>, offered: &[&SourcePage]) -> Vec<ConfidentField<String>> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for field in items.into_iter().map(|item| item.into_field(offered)) {
        if !field.is_extracted() {
            continue;
        }
        let key = field.content.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(field);
        if out.len() == MAX_LIST_ITEMS {
            break;
        }
    }
    out
}

/// A parsed answer for one field.
#[derive(Debug)]
enum FieldValue {
    Fact(ConfidentField<String>),
    List(Vec<ConfidentField<String>>),
    Segments(Vec<IcpSegment>),
}

impl FieldValue {
    fn parse(task: FieldTask, raw: Value, offered: &[&SourcePage]) -> Result<Self> {
        let mismatch = |e: serde_json::Error| {
            ContextPackError::parse(format!("{} answer did not match its schema: {e}", task.key()))
        };

        Ok(match task.shape() {
            Shape::Fact => {
                let answer: FactAnswer = serde_json::from_value(raw).map_err(mismatch)?;
                Self::Fact(answer.into_field(offered))
            }
            Shape::List => {
                let answer: ListAnswer = serde_json::from_value(raw).map_err(mismatch)?;
                Self::List(collect_items(answer.items, offered))
            }
            Shape::Segments => {
                let answer: SegmentsAnswer = serde_json::from_value(raw).map_err(mismatch)?;
                let segments = answer
                    .segments
                    .into_iter()
                    .filter_map(|seg| seg.into_segment(offered))
                    .take(MAX_LIST_ITEMS)
                    .collect();
                Self::Segments(segments)
            }
        })
    }

    /// The degraded value for a field whose call failed.
    fn failed(task: FieldTask, err: &ContextPackError) -> Self {
        match task.shape() {
            Shape::Fact => Self::Fact(ConfidentField::empty(format!("extraction failed: {err}"))),
            Shape::List => Self::List(Vec::new()),
            Shape::Segments => Self::Segments(Vec::new()),
        }
    }

    fn apply(self, task: FieldTask, out: &mut ExtractionResult) {
        match (task, self) {
            (FieldTask::Vision, Self::Fact(f)) => out.vision = f,
            (FieldTask::Mission, Self::Fact(f)) => out.mission = f,
            (FieldTask::PricingModel, Self::Fact(f)) => out.business_model.pricing_model = f,
            (FieldTask::Values, Self::List(items)) => out.values = items,
            (FieldTask::RevenueDrivers, Self::List(items)) => {
                out.business_model.revenue_drivers = items
            }
            (FieldTask::JobsToBeDone, Self::List(items)) => out.product.jobs_to_be_done = items,
            (FieldTask::KeyFeatures, Self::List(items)) => out.product.key_features = items,
            (FieldTask::IcpSegments, Self::Segments(segments)) => out.icp.segments = segments,
            (task, value) => warn!(field = task.key(), ?value, "answer shape does not fit field"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Extraction output plus the per-field failures that were absorbed.
#[derive(Debug)]
pub struct Extraction {
    pub result: ExtractionResult,
    /// One warning line per field whose call failed.
    pub failures: Vec<String>,
}

pub struct Extractor {
    backend: Arc<dyn LlmBackend>,
    concurrency: usize,
}

impl Extractor {
    pub fn new(backend: Arc<dyn LlmBackend>, concurrency: usize) -> Self {
        Self {
            backend,
            concurrency: concurrency.max(1),
        }
    }

    /// Extract every field from `pages`.
    ///
    /// An empty page set yields the all-empty result without calling the backend.
    #[instrument(skip_all, fields(pages = pages.len(), model = %self.backend.model_id()))]
    pub async fn extract(
        &self,
        pages: &[SourcePage],
        progress: &dyn ScanProgress,
    ) -> Result<Extraction> {
        if pages.is_empty() {
            info!("no page content, skipping model calls");
            return Ok(Extraction {
                result: ExtractionResult::empty(NO_PAGES_REASON),
                failures: Vec::new(),
            });
        }

        let start = Instant::now();
        let total = FieldTask::ALL.len();
        let finished = AtomicUsize::new(0);
        let counter = &finished;

        // A systemic error ends the stream, so no further fields are requested.
        let outcomes: Vec<(FieldTask, Result<FieldValue>)> = stream::iter(FieldTask::ALL)
            .map(|task| async move {
                let outcome = self.run_task(task, pages).await;
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                progress.field_extracted(task.key(), n, total);
                match outcome {
                    Err(e) if e.is_systemic() => {
                        warn!(field = task.key(), error = %e, "systemic backend failure, aborting extraction");
                        Err(e)
                    }
                    outcome => Ok((task, outcome)),
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut result = ExtractionResult::empty(NOT_STATED_REASON);
        let mut failures = Vec::new();
        let mut last_error = None;

        for (task, outcome) in outcomes {
            match outcome {
                Ok(value) => value.apply(task, &mut result),
                Err(e) => {
                    warn!(field = task.key(), error = %e, "field extraction failed");
                    FieldValue::failed(task, &e).apply(task, &mut result);
                    failures.push(format!("extraction of {} failed: {e}", task.key()));
                    last_error = Some(e);
                }
            }
        }

        if failures.len() == total {
            let last = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(ContextPackError::Provider(format!(
                "all {total} field extractions failed; last error: {last}"
            )));
        }

        info!(
            extracted = result.extracted_count(),
            failed = failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "extraction complete"
        );

        Ok(Extraction { result, failures })
    }

    async fn run_task(&self, task: FieldTask, pages: &[SourcePage]) -> Result<FieldValue> {
        let offered = select_pages(task, pages);
        let prompt = build_prompt(task, &offered);
        debug!(field = task.key(), offered = offered.len(), "requesting field");

        let raw = self.backend.complete(&prompt, &task.schema()).await?;
        FieldValue::parse(task, raw, &offered)
    }
}
