//! Core domain types: scraped pages, confident fields, and the Context Pack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version tag carried by every scan-derived draft pack.
pub const DRAFT_VERSION: &str = "v0";

/// Fixed reason attached to sections that only a founder interview can fill.
///
/// Downstream UI matches on this string; treat it as a contract.
pub const NOT_EXTRACTED_REASON: &str = "not extracted from public pages";

// ---------------------------------------------------------------------------
// Scraping
// ---------------------------------------------------------------------------

/// Conventional page type a candidate URL stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Home,
    About,
    Careers,
    Blog,
}

impl PageKind {
    /// Classify a candidate path segment (`""`, `"about"`, ...).
    ///
    /// Unknown paths are treated as part of the home/marketing surface.
    pub fn from_path(path: &str) -> Self {
        let p = path.trim_matches('/').to_ascii_lowercase();
        if p.starts_with("about") || p.starts_with("company") {
            Self::About
        } else if p.starts_with("careers") || p.starts_with("jobs") {
            Self::Careers
        } else if p.starts_with("blog") || p.starts_with("news") {
            Self::Blog
        } else {
            Self::Home
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::About => "about",
            Self::Careers => "careers",
            Self::Blog => "blog",
        }
    }
}

/// One fetch attempt.
///
/// `success` implies non-empty `content`; a failure always carries `error_message`.
/// Build through [`ScrapedPage::fetched`] / [`ScrapedPage::failed`] to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    pub url: String,
    pub kind: PageKind,
    pub success: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScrapedPage {
    /// A successful fetch. Blank bodies are recorded as failures instead.
    pub fn fetched(url: impl Into<String>, kind: PageKind, content: impl Into<String>) -> Self {
        let content = content.into();
        if content.trim().is_empty() {
            return Self::failed(url, kind, "empty response body");
        }
        Self {
            url: url.into(),
            kind,
            success: true,
            content,
            error_message: None,
        }
    }

    /// A failed fetch with its reason.
    pub fn failed(url: impl Into<String>, kind: PageKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            success: false,
            content: String::new(),
            error_message: Some(message.into()),
        }
    }
}

/// All fetch attempts for one company, in attempt order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub pages: Vec<ScrapedPage>,
    /// One entry per failed page plus any pipeline-level warnings.
    pub errors: Vec<String>,
}

impl ScrapeResult {
    /// Append a page, recording an error line when it failed.
    pub fn push_page(&mut self, page: ScrapedPage) {
        if let Some(msg) = page.error_message.as_deref() {
            self.errors.push(format!("{}: {msg}", page.url));
        }
        self.pages.push(page);
    }

    /// Record a pipeline-level warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// True when no candidate page could be fetched.
    pub fn all_failed(&self) -> bool {
        self.pages.iter().all(|p| !p.success)
    }

    pub fn successful_pages(&self) -> impl Iterator<Item = &ScrapedPage> {
        self.pages.iter().filter(|p| p.success)
    }

    pub fn success_count(&self) -> usize {
        self.successful_pages().count()
    }
}

// ---------------------------------------------------------------------------
// ConfidentField
// ---------------------------------------------------------------------------

/// Self-assessed confidence in `[0, 1]` plus its justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub value: f64,
    pub reason: String,
}

/// Source reference for an extracted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl Citation {
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        let excerpt = excerpt.into();
        if !excerpt.trim().is_empty() {
            self.excerpt = Some(excerpt);
        }
        self
    }
}

/// A value paired with a confidence score and supporting citations.
///
/// A confidence of exactly 0 means "not extracted" and never carries citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidentField<T> {
    pub content: T,
    pub confidence: Confidence,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl<T> ConfidentField<T> {
    /// Build a field, clamping the confidence into `[0, 1]`.
    pub fn new(
        content: T,
        value: f64,
        reason: impl Into<String>,
        citations: Vec<Citation>,
    ) -> Self {
        let value = clamp_confidence(value);
        Self {
            content,
            confidence: Confidence {
                value,
                reason: reason.into(),
            },
            citations: if value == 0.0 { Vec::new() } else { citations },
        }
    }

    pub fn is_extracted(&self) -> bool {
        self.confidence.value > 0.0
    }
}

impl<T: Default> ConfidentField<T> {
    /// A zero-confidence field with the given reason.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self::new(T::default(), 0.0, reason, Vec::new())
    }

    /// The canonical empty field for founder-only sections.
    pub fn not_extracted() -> Self {
        Self::empty(NOT_EXTRACTED_REASON)
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// A named ideal-customer-profile segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpSegment {
    pub name: String,
    pub description: ConfidentField<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcpExtraction {
    pub segments: Vec<IcpSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessModelExtraction {
    pub revenue_drivers: Vec<ConfidentField<String>>,
    pub pricing_model: ConfidentField<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSection {
    pub jobs_to_be_done: Vec<ConfidentField<String>>,
    pub key_features: Vec<ConfidentField<String>>,
}

/// The extractor's full output for one company.
///
/// Every schema field is always present; missing evidence is an empty or
/// zero-confidence field, never an omission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub vision: ConfidentField<String>,
    pub mission: ConfidentField<String>,
    pub values: Vec<ConfidentField<String>>,
    pub icp: IcpExtraction,
    pub business_model: BusinessModelExtraction,
    pub product: ProductSection,
}

impl ExtractionResult {
    /// The all-empty result, every single-valued field carrying `reason`.
    pub fn empty(reason: &str) -> Self {
        Self {
            vision: ConfidentField::empty(reason),
            mission: ConfidentField::empty(reason),
            values: Vec::new(),
            icp: IcpExtraction::default(),
            business_model: BusinessModelExtraction {
                revenue_drivers: Vec::new(),
                pricing_model: ConfidentField::empty(reason),
            },
            product: ProductSection::default(),
        }
    }

    /// Number of fields with non-zero confidence.
    pub fn extracted_count(&self) -> usize {
        self.confident_fields()
            .iter()
            .filter(|f| f.confidence.value > 0.0)
            .count()
    }

    pub fn confident_fields(&self) -> Vec<FieldRef<'_>> {
        let mut out = Vec::new();
        push_field(&mut out, "vision".into(), &self.vision);
        push_field(&mut out, "mission".into(), &self.mission);
        push_list(&mut out, "values", &self.values);
        for (i, seg) in self.icp.segments.iter().enumerate() {
            push_field(&mut out, format!("icp.segments[{i}].description"), &seg.description);
        }
        push_list(&mut out, "businessModel.revenueDrivers", &self.business_model.revenue_drivers);
        push_field(&mut out, "businessModel.pricingModel".into(), &self.business_model.pricing_model);
        push_list(&mut out, "product.jobsToBeDone", &self.product.jobs_to_be_done);
        push_list(&mut out, "product.keyFeatures", &self.product.key_features);
        out
    }
}

impl From<&ContextPack> for ExtractionResult {
    /// Project the publicly extractable sections of a pack.
    fn from(pack: &ContextPack) -> Self {
        Self {
            vision: pack.vision.clone(),
            mission: pack.mission.clone(),
            values: pack.values.clone(),
            icp: IcpExtraction {
                segments: pack.icp.segments.clone(),
            },
            business_model: BusinessModelExtraction {
                revenue_drivers: pack.business_model.revenue_drivers.clone(),
                pricing_model: pack.business_model.pricing_model.clone(),
            },
            product: pack.product.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextPack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpSection {
    pub segments: Vec<IcpSegment>,
    /// Founder-only.
    pub customer_evolution: ConfidentField<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessModelSection {
    pub revenue_drivers: Vec<ConfidentField<String>>,
    pub pricing_model: ConfidentField<String>,
    /// Founder-only.
    pub internal_metrics: ConfidentField<Vec<String>>,
}

/// The versioned knowledge artifact about one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPack {
    /// URL-safe slug; immutable once assigned.
    pub id: String,
    pub company_name: String,
    pub company_url: String,
    /// `"v0"` for scan drafts, later versions after the founder interview.
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vision: ConfidentField<String>,
    pub mission: ConfidentField<String>,
    pub values: Vec<ConfidentField<String>>,
    pub icp: IcpSection,
    pub business_model: BusinessModelSection,
    pub product: ProductSection,
    /// Founder-only; empty at v0.
    pub decision_rules: ConfidentField<Vec<String>>,
    /// Founder-only; empty at v0.
    #[serde(rename = "engineeringKPIs")]
    pub engineering_kpis: ConfidentField<Vec<String>>,
    /// Derived narrative rollup.
    pub summary: String,
}

impl ContextPack {
    /// Every confident field in the pack, keyed by its dotted wire path.
    pub fn confident_fields(&self) -> Vec<FieldRef<'_>> {
        let mut out = Vec::new();
        push_field(&mut out, "vision".into(), &self.vision);
        push_field(&mut out, "mission".into(), &self.mission);
        push_list(&mut out, "values", &self.values);
        for (i, seg) in self.icp.segments.iter().enumerate() {
            push_field(&mut out, format!("icp.segments[{i}].description"), &seg.description);
        }
        push_field(&mut out, "icp.customerEvolution".into(), &self.icp.customer_evolution);
        push_list(&mut out, "businessModel.revenueDrivers", &self.business_model.revenue_drivers);
        push_field(&mut out, "businessModel.pricingModel".into(), &self.business_model.pricing_model);
        push_field(
            &mut out,
            "businessModel.internalMetrics".into(),
            &self.business_model.internal_metrics,
        );
        push_list(&mut out, "product.jobsToBeDone", &self.product.jobs_to_be_done);
        push_list(&mut out, "product.keyFeatures", &self.product.key_features);
        push_field(&mut out, "decisionRules".into(), &self.decision_rules);
        push_field(&mut out, "engineeringKPIs".into(), &self.engineering_kpis);
        out
    }
}

/// Borrowed view of one confident field, used for auditing and display.
#[derive(Debug, Clone)]
pub struct FieldRef<'a> {
    pub path: String,
    pub confidence: &'a Confidence,
    pub citations: &'a [Citation],
}

fn push_field<'a, T>(out: &mut Vec<FieldRef<'a>>, path: String, field: &'a ConfidentField<T>) {
    out.push(FieldRef {
        path,
        confidence: &field.confidence,
        citations: &field.citations,
    });
}

fn push_list<'a>(out: &mut Vec<FieldRef<'a>>, base: &str, fields: &'a [ConfidentField<String>]) {
    for (i, field) in fields.iter().enumerate() {
        push_field(out, format!("{base}[{i}]"), field);
    }
}
