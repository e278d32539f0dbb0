//! Bounded, concurrent fetcher for a company's conventional pages.
//!
//! The fetcher derives a fixed candidate list (home, about, careers, blog) from
//! the company URL, fetches every candidate independently, and records success
//! or failure per page. A failing page never aborts the others.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use contextpack_shared::{ContextPackError, PageKind, Result, ScanConfig, ScrapeResult, ScrapedPage};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("ContextPack/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// One URL the fetcher will try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePage {
    pub kind: PageKind,
    pub url: Url,
}

/// Derive the candidate URLs for `base` from the configured paths.
///
/// Paths are resolved against the site origin, so `https://acme.com/pricing?x=1`
/// and `https://acme.com` yield the same candidates. Duplicates are dropped,
/// keeping the first occurrence.
pub fn candidate_urls(base: &Url, paths: &[String]) -> Vec<CandidatePage> {
    let mut origin = base.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for path in paths {
        let trimmed = path.trim_matches('/');
        let Ok(url) = origin.join(trimmed) else {
            warn!(path = %path, "skipping unparseable candidate path");
            continue;
        };
        if seen.insert(url.to_string()) {
            out.push(CandidatePage {
                kind: PageKind::from_path(trimmed),
                url,
            });
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Concurrent page fetcher.
pub struct Fetcher {
    client: Client,
    candidate_paths: Vec<String>,
    concurrency: usize,
    timeout: Duration,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.page_timeout_secs.max(1));
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(config.allow_private_hosts))
            .timeout(timeout)
            .build()
            .map_err(|e| ContextPackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            candidate_paths: config.candidate_paths.clone(),
            concurrency: config.fetch_concurrency.max(1) as usize,
            timeout,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Fetch every candidate page for `base`.
    ///
    /// Never fails: each page's outcome is recorded in the returned
    /// [`ScrapeResult`], in candidate order.
    #[instrument(skip_all, fields(base = %base))]
    pub async fn fetch_all(&self, base: &Url) -> ScrapeResult {
        let start = std::time::Instant::now();
        let candidates = candidate_urls(base, &self.candidate_paths);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            candidates = candidates.len(),
            concurrency = self.concurrency,
            timeout_secs = self.timeout.as_secs(),
            "fetching candidate pages"
        );

        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            if !self.allow_private_hosts && is_ssrf_target(&candidate.url) {
                warn!(url = %candidate.url, "SSRF protection: blocked");
                handles.push(None);
                continue;
            }

            let client = self.client.clone();
            let sem = semaphore.clone();
            let url = candidate.url.clone();
            let timeout = self.timeout;

            handles.push(Some(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| ContextPackError::Network(format!("fetch pool closed: {e}")))?;
                fetch_page(&client, &url, timeout).await
            })));
        }

        let mut result = ScrapeResult::default();

        for (candidate, handle) in candidates.iter().zip(handles) {
            let url = candidate.url.to_string();
            let page = match handle {
                None => ScrapedPage::failed(&url, candidate.kind, "blocked: private or non-HTTP host"),
                Some(handle) => match handle.await {
                    Ok(Ok(body)) => ScrapedPage::fetched(&url, candidate.kind, body),
                    Ok(Err(e)) => ScrapedPage::failed(&url, candidate.kind, failure_reason(&e)),
                    Err(e) => ScrapedPage::failed(&url, candidate.kind, format!("fetch task failed: {e}")),
                },
            };

            match &page.error_message {
                Some(reason) => warn!(%url, %reason, "page fetch failed"),
                None => debug!(%url, bytes = page.content.len(), "page fetched"),
            }
            result.push_page(page);
        }

        info!(
            pages_fetched = result.success_count(),
            pages_failed = result.pages.len() - result.success_count(),
            duration_ms = start.elapsed().as_millis(),
            "fetch completed"
        );

        result
    }
}

fn failure_reason(err: &ContextPackError) -> String {
    match err {
        ContextPackError::Network(msg) => msg.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Redirect policy that re-runs the SSRF check on every hop.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        match check_redirect(attempt.url(), attempt.previous().len(), allow_private_hosts) {
            Ok(()) => attempt.follow(),
            Err(reason) => attempt.error(reason),
        }
    })
}

/// Decide whether a redirect hop to `next` may be followed.
fn check_redirect(
    next: &Url,
    hops: usize,
    allow_private_hosts: bool,
) -> std::result::Result<(), &'static str> {
    if hops >= MAX_REDIRECTS {
        return Err("too many redirects");
    }
    if !allow_private_hosts && is_ssrf_target(next) {
        return Err("redirect to a private or non-HTTP host blocked");
    }
    Ok(())
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_ip(&IpAddr::V4(v4)),
            None => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unicast_link_local()
                    || v6.is_unique_local()
                    || v6.is_multicast()
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch a single page body.
async fn fetch_page(client: &Client, url: &Url, timeout: Duration) -> Result<String> {
    debug!(%url, "fetching page");

    let response = client.get(url.as_str()).send().await.map_err(|e| {
        if e.is_timeout() {
            ContextPackError::Network(format!("timed out after {}s", timeout.as_secs()))
        } else {
            ContextPackError::Network(format!("request failed: {e}"))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ContextPackError::Network(format!("HTTP {status}")));
    }

    response.text().await.map_err(|e| {
        if e.is_timeout() {
            ContextPackError::Network(format!("timed out after {}s", timeout.as_secs()))
        } else {
            ContextPackError::Network(format!("body read failed: {e}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn default_paths() -> Vec<String> {
        ScanConfig::default().candidate_paths
    }

    fn test_config() -> ScanConfig {
        ScanConfig {
            page_timeout_secs: 1,
            allow_private_hosts: true,
            ..ScanConfig::default()
        }
    }

    #[test]
    fn candidates_resolve_against_origin() {
        let base = Url::parse("https://acme.example.com/pricing?plan=pro#top").unwrap();
        let candidates = candidate_urls(&base, &default_paths());
        let urls: Vec<String> = candidates.iter().map(|c| c.url.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://acme.example.com/",
                "https://acme.example.com/about",
                "https://acme.example.com/careers",
                "https://acme.example.com/blog",
            ]
        );
        assert_eq!(candidates[0].kind, PageKind::Home);
        assert_eq!(candidates[1].kind, PageKind::About);
        assert_eq!(candidates[2].kind, PageKind::Careers);
        assert_eq!(candidates[3].kind, PageKind::Blog);
    }

    #[test]
    fn duplicate_candidates_are_dropped() {
        let base = Url::parse("https://acme.example.com").unwrap();
        let paths = vec!["".to_string(), "/".to_string(), "about/".to_string(), "about".to_string()];
        let candidates = candidate_urls(&base, &paths);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn ssrf_protection_blocks_private_targets() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://10.0.0.1/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://[::1]/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/api").unwrap()));
    }

    #[test]
    fn ssrf_protection_blocks_ipv6_private_ranges() {
        for target in [
            "http://[::ffff:127.0.0.1]/",
            "http://[::ffff:10.0.0.1]/",
            "http://[::ffff:192.168.0.10]:8080/",
            "http://[fe80::1]/",
            "http://[fd00::1]/",
            "http://[fc00::abcd]/",
        ] {
            assert!(is_ssrf_target(&Url::parse(target).unwrap()), "{target} not blocked");
        }
    }

    #[test]
    fn ssrf_protection_allows_public() {
        assert!(!is_ssrf_target(&Url::parse("https://acme.example.com/about").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("http://[2606:4700::1111]/").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("http://[::ffff:8.8.8.8]/").unwrap()));
    }

    #[test]
    fn redirects_are_checked_on_every_hop() {
        let private = Url::parse("http://169.254.169.254/latest/meta-data").unwrap();
        let public = Url::parse("https://acme.example.com/about").unwrap();

        assert!(check_redirect(&public, 0, false).is_ok());
        assert!(check_redirect(&private, 1, false).is_err());
        assert!(check_redirect(&private, 1, true).is_ok());
        assert_eq!(check_redirect(&public, MAX_REDIRECTS, false), Err("too many redirects"));
    }

    #[tokio::test]
    async fn mapped_loopback_host_is_not_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("internal secret"))
            .expect(0)
            .mount(&server)
            .await;

        let port = server.address().port();
        let config = ScanConfig {
            page_timeout_secs: 1,
            candidate_paths: vec!["".into()],
            ..ScanConfig::default()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        let base = Url::parse(&format!("http://[::ffff:127.0.0.1]:{port}/")).unwrap();
        let result = fetcher.fetch_all(&base).await;

        assert!(result.all_failed());
        assert!(result.pages[0].content.is_empty());
        assert!(result.pages[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("blocked")));
    }

    #[tokio::test]
    async fn redirect_to_private_host_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://10.0.0.1/admin"),
            )
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(redirect_policy(false))
            .build()
            .unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetch_page(&client, &url, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ContextPackError::Network(_)));
    }

    #[tokio::test]
    async fn failures_are_isolated_per_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Acme</h1>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Join us</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>late</p>")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch_all(&base).await;

        assert_eq!(result.pages.len(), 4);
        assert!(result.pages[0].success);
        assert!(!result.pages[1].success);
        assert!(result.pages[1].error_message.as_deref().unwrap().contains("404"));
        assert!(result.pages[2].success);
        assert!(!result.pages[3].success);
        assert!(result.pages[3].error_message.as_deref().unwrap().contains("timed out"));

        assert_eq!(result.success_count(), 2);
        assert_eq!(result.errors.len(), 2);
        assert!(!result.all_failed());
    }

    #[tokio::test]
    async fn every_page_failing_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_config()).unwrap();
        let base = Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch_all(&base).await;

        assert_eq!(result.pages.len(), 4);
        assert!(result.all_failed());
        assert_eq!(result.errors.len(), 4);
    }

    #[tokio::test]
    async fn blocked_hosts_are_recorded_as_failures() {
        let config = ScanConfig {
            page_timeout_secs: 1,
            ..ScanConfig::default()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let result = fetcher.fetch_all(&base).await;

        assert!(result.all_failed());
        assert!(result.pages.iter().all(|p| {
            p.error_message
                .as_deref()
                .is_some_and(|m| m.starts_with("blocked"))
        }));
    }

    #[tokio::test]
    async fn empty_body_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let config = ScanConfig {
            candidate_paths: vec!["".into()],
            ..test_config()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        let result = fetcher.fetch_all(&Url::parse(&server.uri()).unwrap()).await;

        assert_eq!(result.pages.len(), 1);
        assert!(!result.pages[0].success);
        assert_eq!(result.pages[0].error_message.as_deref(), Some("empty response body"));
    }
}
