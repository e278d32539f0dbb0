//! Canned data for demo scans.

use chrono::Utc;
use url::Url;

use contextpack_crawler::candidate_urls;
use contextpack_shared::{
    BusinessModelSection, Citation, ConfidentField, ContextPack, DRAFT_VERSION, IcpSection,
    IcpSegment, PageKind, ProductSection, ScanConfig, ScrapeResult, ScrapedPage,
};

pub const DEMO_COMPANY_NAME: &str = "Acme SaaS";

/// Supplies mock inputs for demo mode.
pub trait DemoDataProvider: Send + Sync {
    /// Name used when the request does not provide one.
    fn default_company_name(&self) -> String;

    /// A successful scrape of the company's candidate pages.
    fn mock_scrape_result(&self, company_url: &Url) -> ScrapeResult;

    /// A schema-complete pack for `company_name`, citing pages of `company_url`.
    fn mock_context_pack(&self, company_name: &str, company_url: &Url) -> ContextPack;
}

/// Built-in demo data for a fictional finance-automation company.
#[derive(Debug, Clone)]
pub struct CannedDemoData {
    candidate_paths: Vec<String>,
}

impl CannedDemoData {
    /// Demo data mirroring the fetcher's candidate paths.
    pub fn new(candidate_paths: Vec<String>) -> Self {
        Self { candidate_paths }
    }
}

impl Default for CannedDemoData {
    fn default() -> Self {
        Self::new(ScanConfig::default().candidate_paths)
    }
}

fn page_html(kind: PageKind) -> &'static str {
    match kind {
        PageKind::Home => {
            "<html><head><title>Acme SaaS | Close the books in a day</title></head><body><main>\
             <h1>Close the books in a day</h1>\
             <p>Acme SaaS automates reconciliation and reporting for mid-market finance teams.</p>\
             <p>Plans start at $49 per seat per month.</p></main></body></html>"
        }
        PageKind::About => {
            "<html><head><title>About Acme SaaS</title></head><body><main>\
             <h1>Our mission</h1><p>Make month-end boring for every finance team.</p>\
             <p>We imagine a world where the books close themselves.</p></main></body></html>"
        }
        PageKind::Careers => {
            "<html><head><title>Careers at Acme SaaS</title></head><body><main>\
             <h1>How we work</h1><ul><li>Candor over comfort</li><li>Own the outcome</li></ul>\
             </main></body></html>"
        }
        PageKind::Blog => {
            "<html><head><title>Acme SaaS Blog</title></head><body><main>\
             <h1>Release notes</h1><p>Bank feeds now sync every hour.</p></main></body></html>"
        }
    }
}

fn page_url(base: &Url, path: &str) -> String {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

impl DemoDataProvider for CannedDemoData {
    fn default_company_name(&self) -> String {
        DEMO_COMPANY_NAME.to_string()
    }

    fn mock_scrape_result(&self, company_url: &Url) -> ScrapeResult {
        let mut result = ScrapeResult::default();
        for candidate in candidate_urls(company_url, &self.candidate_paths) {
            result.push_page(ScrapedPage::fetched(
                candidate.url.as_str(),
                candidate.kind,
                page_html(candidate.kind),
            ));
        }
        result
    }

    fn mock_context_pack(&self, company_name: &str, company_url: &Url) -> ContextPack {
        let fact = |content: &str, value: f64, reason: &str, path: &str, excerpt: &str| {
            ConfidentField::new(
                content.to_string(),
                value,
                reason,
                vec![Citation::page(page_url(company_url, path)).with_excerpt(excerpt)],
            )
        };
        let now = Utc::now();
        ContextPack {
            id: "demo".into(),
            company_name: company_name.to_string(),
            company_url: company_url.to_string(),
            version: DRAFT_VERSION.into(),
            created_at: now,
            updated_at: now,
            vision: fact(
                "A world where the books close themselves",
                0.7,
                "stated on the about page",
                "about",
                "We imagine a world where the books close themselves.",
            ),
            mission: fact(
                "Make month-end boring for every finance team",
                0.9,
                "explicit mission statement",
                "about",
                "Make month-end boring for every finance team.",
            ),
            values: vec![
                fact("Candor over comfort", 0.8, "listed on the careers page", "careers", "Candor over comfort"),
                fact("Own the outcome", 0.8, "listed on the careers page", "careers", "Own the outcome"),
            ],
            icp: IcpSection {
                segments: vec![IcpSegment {
                    name: "Mid-market finance teams".into(),
                    description: fact(
                        "Controllers and accounting leads at companies with 50 to 500 employees",
                        0.6,
                        "hero copy names the audience",
                        "",
                        "for mid-market finance teams",
                    ),
                }],
                customer_evolution: ConfidentField::not_extracted(),
            },
            business_model: BusinessModelSection {
                revenue_drivers: vec![fact(
                    "Per-seat subscriptions",
                    0.7,
                    "pricing mentioned on the home page",
                    "",
                    "$49 per seat per month",
                )],
                pricing_model: fact(
                    "Per-seat monthly subscription starting at $49",
                    0.7,
                    "pricing mentioned on the home page",
                    "",
                    "Plans start at $49 per seat per month.",
                ),
                internal_metrics: ConfidentField::not_extracted(),
            },
            product: ProductSection {
                jobs_to_be_done: vec![fact(
                    "Close the books in a day",
                    0.8,
                    "headline promise",
                    "",
                    "Close the books in a day",
                )],
                key_features: vec![
                    fact("Automated reconciliation", 0.8, "home page", "", "automates reconciliation"),
                    fact("Hourly bank feed sync", 0.6, "release notes", "blog", "Bank feeds now sync every hour."),
                ],
            },
            decision_rules: ConfidentField::not_extracted(),
            engineering_kpis: ConfidentField::not_extracted(),
            summary: String::new(),
        }
    }
}
