//! End-to-end scan pipeline: request → fetch → normalize → extract → assemble → pack.
//!
//! [`ScanOrchestrator::handle`] is the request boundary: it validates a JSON
//! body, runs the scan, and returns an HTTP-style reply. Demo mode swaps the
//! fetch and extract stages for canned data and feeds the same assembler.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, field, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use contextpack_crawler::Fetcher;
use contextpack_llm::LlmBackend;
use contextpack_shared::{
    ContextPack, ContextPackError, ExtractionResult, FieldError, Result, ScanConfig,
};
use contextpack_storage::PackStore;

use crate::assembler::{assemble, company_name_from_url};
use crate::demo::{CannedDemoData, DemoDataProvider};
use crate::extractor::{Extractor, prepare_pages};
use crate::progress::{ScanPhase, ScanProgress};

const EMPTY_EXTRACTION_WARNING: &str = "Pages were fetched but no facts could be extracted. \
The site may render its content with JavaScript; fill in the pack through the founder interview.";

const MISSING_BACKEND_MESSAGE: &str =
    "OpenRouter API key not configured. Set the OPENROUTER_API_KEY environment variable.";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Inbound scan request, as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub company_url: Option<String>,
    pub company_name: Option<String>,
    pub demo_mode: Option<bool>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidScan {
    /// The URL as supplied, trimmed.
    pub raw_url: String,
    pub company_url: Url,
    pub company_name: Option<String>,
    pub demo_mode: bool,
}

impl ScanRequest {
    pub fn new(company_url: impl Into<String>) -> Self {
        Self {
            company_url: Some(company_url.into()),
            ..Self::default()
        }
    }

    /// Read a request from a JSON body, reporting mistyped fields.
    pub fn from_json(body: &Value) -> Result<Self> {
        let Some(obj) = body.as_object() else {
            return Err(ContextPackError::validation(
                "body",
                "request body must be a JSON object",
            ));
        };

        let mut errors = Vec::new();
        let mut string_field = |key: &str| match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(FieldError::new(key, format!("{key} must be a string")));
                None
            }
        };
        let company_url = string_field("companyUrl");
        let company_name = string_field("companyName");

        let demo_mode = match obj.get("demoMode") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                errors.push(FieldError::new("demoMode", "demoMode must be a boolean"));
                None
            }
        };

        if !errors.is_empty() {
            return Err(ContextPackError::Validation { fields: errors });
        }
        Ok(Self {
            company_url,
            company_name,
            demo_mode,
        })
    }

    /// Check required fields and URL syntax.
    pub fn validate(&self) -> Result<ValidScan> {
        let raw = self.company_url.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(ContextPackError::validation(
                "companyUrl",
                "companyUrl is required",
            ));
        }

        let url = Url::parse(raw).map_err(|e| {
            ContextPackError::validation("companyUrl", format!("companyUrl must be a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ContextPackError::validation(
                "companyUrl",
                "companyUrl must use http or https",
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ContextPackError::validation(
                "companyUrl",
                "companyUrl must include a host",
            ));
        }

        let company_name = self
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(ValidScan {
            raw_url: raw.to_string(),
            company_url: url,
            company_name,
            demo_mode: self.demo_mode.unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Successful scan outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub pack_id: String,
    pub draft_pack: ContextPack,
    /// Number of successfully fetched pages.
    pub scraped_pages: usize,
    pub errors: Vec<String>,
}

/// Error envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&ContextPackError> for ErrorBody {
    fn from(err: &ContextPackError) -> Self {
        let retry_after_secs = match err {
            ContextPackError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        };
        Self {
            error: err.to_string(),
            fields: err.field_errors().to_vec(),
            retry_after_secs,
        }
    }
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn ok(response: &ScanResponse) -> Self {
        match serde_json::to_value(response) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&ContextPackError::Provider(format!(
                "failed to serialize response: {e}"
            ))),
        }
    }

    pub fn error(err: &ContextPackError) -> Self {
        let body = serde_json::to_value(ErrorBody::from(err))
            .unwrap_or_else(|_| serde_json::json!({ "error": err.to_string() }));
        Self {
            status: err.status_code(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// A reply plus the pending persistence write, if any.
#[derive(Debug)]
pub struct ScanOutcome {
    pub reply: HttpReply,
    persistence: Option<JoinHandle<()>>,
}

impl ScanOutcome {
    /// Wait for the persistence write, then return the reply.
    ///
    /// The reply is fixed before the write starts; a failed write only logs.
    pub async fn settle(self) -> HttpReply {
        if let Some(handle) = self.persistence {
            if let Err(e) = handle.await {
                warn!(error = %e, "persistence task did not complete");
            }
        }
        self.reply
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

enum Backend {
    Ready(Arc<dyn LlmBackend>),
    Unavailable { credential: bool, message: String },
}

impl Backend {
    fn get(&self) -> Result<&Arc<dyn LlmBackend>> {
        match self {
            Self::Ready(backend) => Ok(backend),
            Self::Unavailable {
                credential: true,
                message,
            } => Err(ContextPackError::Credential(message.clone())),
            Self::Unavailable { message, .. } => Err(ContextPackError::Provider(message.clone())),
        }
    }
}

/// What a scan produced before assembly. Demo and live paths both end here.
struct Produced {
    company_name: String,
    extraction: ExtractionResult,
    scraped_pages: usize,
    errors: Vec<String>,
}

/// Runs scans against a model backend, a pack store and demo data.
pub struct ScanOrchestrator {
    config: ScanConfig,
    backend: Backend,
    store: Arc<dyn PackStore>,
    demo: Arc<dyn DemoDataProvider>,
}

impl ScanOrchestrator {
    /// An orchestrator with no model backend; live scans fail until one is set.
    pub fn new(config: ScanConfig, store: Arc<dyn PackStore>) -> Self {
        let demo: Arc<dyn DemoDataProvider> =
            Arc::new(CannedDemoData::new(config.candidate_paths.clone()));
        Self {
            config,
            backend: Backend::Unavailable {
                credential: true,
                message: MISSING_BACKEND_MESSAGE.into(),
            },
            store,
            demo,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Backend::Ready(backend);
        self
    }

    /// Use the outcome of backend construction. A construction error is
    /// reported by live scans only, so demo scans keep working without a key.
    pub fn with_backend_result(mut self, backend: Result<Arc<dyn LlmBackend>>) -> Self {
        self.backend = match backend {
            Ok(backend) => Backend::Ready(backend),
            Err(e) => Backend::Unavailable {
                credential: matches!(e, ContextPackError::Credential(_)),
                message: e.to_string(),
            },
        };
        self
    }

    pub fn with_demo_data(mut self, demo: Arc<dyn DemoDataProvider>) -> Self {
        self.demo = demo;
        self
    }

    /// Validate a JSON request body and run the scan.
    pub async fn handle(&self, body: &Value, progress: &dyn ScanProgress) -> ScanOutcome {
        let result = match ScanRequest::from_json(body) {
            Ok(request) => self.scan(&request, progress).await,
            Err(e) => Err(e),
        };

        match result {
            Ok((response, persistence)) => ScanOutcome {
                reply: HttpReply::ok(&response),
                persistence: Some(persistence),
            },
            Err(e) => ScanOutcome {
                reply: HttpReply::error(&e),
                persistence: None,
            },
        }
    }

    /// Run one scan. Returns the response and the spawned persistence task.
    #[instrument(skip_all, fields(scan_id = %Uuid::now_v7(), url = field::Empty, demo = field::Empty))]
    pub async fn scan(
        &self,
        request: &ScanRequest,
        progress: &dyn ScanProgress,
    ) -> Result<(ScanResponse, JoinHandle<()>)> {
        let start = Instant::now();
        progress.phase(ScanPhase::Start);

        let scan = request.validate().inspect_err(|e| {
            info!(error = %e, "rejected scan request");
        })?;
        Span::current().record("url", scan.raw_url.as_str());
        Span::current().record("demo", scan.demo_mode);

        let produced = if scan.demo_mode {
            Ok(self.demo_scan(&scan))
        } else {
            self.live_scan(&scan, progress).await
        };
        let produced = match produced {
            Ok(produced) => produced,
            Err(e) => {
                progress.phase(ScanPhase::Failed);
                warn!(error = %e, status = e.status_code(), "scan failed");
                return Err(e);
            }
        };

        let pack = assemble(
            &scan.raw_url,
            &produced.company_name,
            produced.extraction,
            Utc::now(),
        );
        progress.phase(ScanPhase::Done);

        info!(
            pack_id = %pack.id,
            scraped_pages = produced.scraped_pages,
            extracted = ExtractionResult::from(&pack).extracted_count(),
            warnings = produced.errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );

        let response = ScanResponse {
            pack_id: pack.id.clone(),
            draft_pack: pack.clone(),
            scraped_pages: produced.scraped_pages,
            errors: produced.errors,
        };
        Ok((response, self.persist(pack)))
    }

    fn demo_scan(&self, scan: &ValidScan) -> Produced {
        let scrape = self.demo.mock_scrape_result(&scan.company_url);
        let company_name = scan
            .company_name
            .clone()
            .unwrap_or_else(|| self.demo.default_company_name());
        let mock = self.demo.mock_context_pack(&company_name, &scan.company_url);

        debug!(pages = scrape.pages.len(), "using demo data");
        Produced {
            company_name,
            extraction: ExtractionResult::from(&mock),
            scraped_pages: scrape.success_count(),
            errors: scrape.errors,
        }
    }

    async fn live_scan(&self, scan: &ValidScan, progress: &dyn ScanProgress) -> Result<Produced> {
        progress.phase(ScanPhase::Fetching);
        // Fail before any request goes out if the model cannot be reached.
        let backend = self.backend.get()?;
        let fetcher = Fetcher::new(&self.config)?;
        let mut scrape = fetcher.fetch_all(&scan.company_url).await;

        let total = scrape.pages.len();
        for (i, page) in scrape.pages.iter().enumerate() {
            progress.page_fetched(page, i + 1, total);
        }
        if scrape.all_failed() {
            warn!(pages = total, "every candidate page failed, continuing with an empty page set");
            scrape.warn(format!(
                "all {total} candidate pages failed to load; the draft pack is empty"
            ));
        }

        let pages = prepare_pages(&scrape, self.config.max_page_chars);
        let scraped_pages = scrape.success_count();

        progress.phase(ScanPhase::Extracting);
        let extractor = Extractor::new(
            Arc::clone(backend),
            self.config.extraction_concurrency as usize,
        );
        let extraction = extractor.extract(&pages, progress).await?;

        progress.phase(ScanPhase::Assembling);
        let mut errors = scrape.errors;
        errors.extend(extraction.failures);
        if scraped_pages > 0 && extraction.result.extracted_count() == 0 {
            warn!(scraped_pages, "no fields extracted from fetched pages");
            errors.push(EMPTY_EXTRACTION_WARNING.to_string());
        }

        let company_name = scan
            .company_name
            .clone()
            .unwrap_or_else(|| company_name_from_url(&scan.raw_url));

        Ok(Produced {
            company_name,
            extraction: extraction.result,
            scraped_pages,
            errors,
        })
    }

    /// Save the pack in the background. Failures are logged only.
    fn persist(&self, pack: ContextPack) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(
            async move {
                match store.save_context_pack(&pack).await {
                    Ok(()) => debug!(pack_id = %pack.id, "pack persisted"),
                    Err(e) => warn!(pack_id = %pack.id, error = %e, "failed to persist pack"),
                }
            }
            .in_current_span(),
        )
    }
}
