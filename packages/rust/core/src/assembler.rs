//! Context pack assembly.
//!
//! Turns an [`ExtractionResult`] into a v0 [`ContextPack`]: extracted fields
//! are copied as-is, founder-only sections get the canonical empty field, and
//! the pack receives a URL-safe ID and a Markdown summary.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use contextpack_shared::{
    BusinessModelSection, ConfidentField, ContextPack, DRAFT_VERSION, ExtractionResult,
    IcpSection,
};

/// Name used when none can be derived from the company URL.
pub const FALLBACK_COMPANY_NAME: &str = "Unknown Company";

/// Build a draft pack from an extraction.
#[instrument(skip_all, fields(company = %company_name))]
pub fn assemble(
    company_url: &str,
    company_name: &str,
    extraction: ExtractionResult,
    now: DateTime<Utc>,
) -> ContextPack {
    let ExtractionResult {
        vision,
        mission,
        values,
        icp,
        business_model,
        product,
    } = extraction;

    let mut pack = ContextPack {
        id: pack_id(company_name, now),
        company_name: company_name.to_string(),
        company_url: company_url.to_string(),
        version: DRAFT_VERSION.to_string(),
        created_at: now,
        updated_at: now,
        vision,
        mission,
        values,
        icp: IcpSection {
            segments: icp.segments,
            customer_evolution: ConfidentField::not_extracted(),
        },
        business_model: BusinessModelSection {
            revenue_drivers: business_model.revenue_drivers,
            pricing_model: business_model.pricing_model,
            internal_metrics: ConfidentField::not_extracted(),
        },
        product,
        decision_rules: ConfidentField::not_extracted(),
        engineering_kpis: ConfidentField::not_extracted(),
        summary: String::new(),
    };
    pack.summary = build_summary(&pack);

    debug!(pack_id = %pack.id, fields = pack.confident_fields().len(), "pack assembled");
    pack
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Lower-case slug: runs of anything but ASCII letters and digits become one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `<slug>-<created millis>-<8 random hex>`, always within `[a-z0-9-]`.
pub fn pack_id(company_name: &str, created_at: DateTime<Utc>) -> String {
    let slug = match slugify(company_name) {
        s if s.is_empty() => "pack".to_string(),
        s => s,
    };
    // The tail of a v7 UUID is random.
    let random = Uuid::now_v7().simple().to_string();
    let suffix = &random[random.len() - 8..];
    format!("{slug}-{}-{suffix}", created_at.timestamp_millis().max(0))
}

/// Derive a display name from a company URL, e.g. `https://www.acme.io` -> `Acme`.
///
/// Never fails: unparseable input yields [`FALLBACK_COMPANY_NAME`].
pub fn company_name_from_url(company_url: &str) -> String {
    let Ok(url) = Url::parse(company_url.trim()) else {
        return FALLBACK_COMPANY_NAME.to_string();
    };
    let Some(host) = url.host_str() else {
        return FALLBACK_COMPANY_NAME.to_string();
    };

    let host = host.strip_prefix("www.").unwrap_or(host);
    let label = host.split('.').next().unwrap_or_default();

    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => FALLBACK_COMPANY_NAME.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Deterministic Markdown rollup of a pack. Empty sections are omitted.
pub fn build_summary(pack: &ContextPack) -> String {
    let mut out = format!("# {} Context Pack ({})\n", pack.company_name, pack.version);

    let mut statements = String::new();
    if has_text(&pack.mission) {
        let _ = writeln!(statements, "**Mission:** {}", pack.mission.content.trim());
    }
    if has_text(&pack.vision) {
        let _ = writeln!(statements, "**Vision:** {}", pack.vision.content.trim());
    }
    if !statements.is_empty() {
        out.push('\n');
        out.push_str(&statements);
    }

    let segments: Vec<_> = pack
        .icp
        .segments
        .iter()
        .filter(|s| !s.name.trim().is_empty())
        .collect();
    if !segments.is_empty() {
        out.push_str("\n## Ideal Customer Segments\n\n");
        for seg in segments {
            if has_text(&seg.description) {
                let _ = writeln!(out, "- **{}**: {}", seg.name.trim(), seg.description.content.trim());
            } else {
                let _ = writeln!(out, "- **{}**", seg.name.trim());
            }
        }
    }

    let jobs: Vec<_> = pack
        .product
        .jobs_to_be_done
        .iter()
        .filter(|j| has_text(j))
        .collect();
    if !jobs.is_empty() {
        out.push_str("\n## Jobs To Be Done\n\n");
        for job in jobs {
            let _ = writeln!(out, "- {}", job.content.trim());
        }
    }

    let _ = write!(
        out,
        "\n_This is a draft ({}) built from public pages. Complete the founder interview to reach the next version._\n",
        pack.version
    );
    out
}

fn has_text(field: &ConfidentField<String>) -> bool {
    field.is_extracted() && !field.content.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use contextpack_shared::{
        Citation, IcpExtraction, IcpSegment, NOT_EXTRACTED_REASON, ProductSection,
    };

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000, 0).single().unwrap()
    }

    fn extraction() -> ExtractionResult {
        let cite = || vec![Citation::page("https://acme.example/about")];
        let mut result = ExtractionResult::empty("not stated on the scanned pages");
        result.mission = ConfidentField::new("Make month-end boring".into(), 0.9, "about page", cite());
        result.icp = IcpExtraction {
            segments: vec![IcpSegment {
                name: "Finance teams".into(),
                description: ConfidentField::new("Mid-market controllers".into(), 0.8, "hero", cite()),
            }],
        };
        result.product = ProductSection {
            jobs_to_be_done: vec![ConfidentField::new("Close the books in a day".into(), 0.7, "home", cite())],
            key_features: Vec::new(),
        };
        result
    }

    #[test]
    fn extracted_fields_are_copied_verbatim() {
        let input = extraction();
        let pack = assemble("https://acme.example", "Acme", input.clone(), at());

        assert_eq!(pack.mission, input.mission);
        assert_eq!(pack.vision, input.vision);
        assert_eq!(pack.icp.segments, input.icp.segments);
        assert_eq!(pack.product, input.product);
        assert_eq!(pack.version, "v0");
        assert_eq!(pack.created_at, at());
        assert!(pack.updated_at >= pack.created_at);
        assert_eq!(ExtractionResult::from(&pack), input);
    }

    #[test]
    fn founder_only_sections_are_canonical_empty() {
        let pack = assemble("https://acme.example", "Acme", extraction(), at());
        let evolution = &pack.icp.customer_evolution;
        assert_eq!(evolution.confidence.value, 0.0);
        assert_eq!(evolution.confidence.reason, NOT_EXTRACTED_REASON);
        assert!(evolution.citations.is_empty());

        for field in [
            &pack.business_model.internal_metrics,
            &pack.decision_rules,
            &pack.engineering_kpis,
        ] {
            assert!(field.content.is_empty());
            assert_eq!(field.confidence.value, 0.0);
            assert_eq!(field.confidence.reason, NOT_EXTRACTED_REASON);
            assert!(field.citations.is_empty());
        }
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Acme SaaS"), "acme-saas");
        assert_eq!(slugify("  --Hello,   World!! "), "hello-world");
        assert_eq!(slugify("Café Über"), "caf-ber");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn pack_ids_are_url_safe_and_unique() {
        let a = pack_id("Acme SaaS, Inc.", at());
        let b = pack_id("Acme SaaS, Inc.", at());

        assert_ne!(a, b);
        assert!(a.starts_with("acme-saas-inc-1760000000000-"));
        for id in [&a, &b, &pack_id("日本", at()), &pack_id("", at())] {
            assert!(!id.is_empty());
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
        assert!(pack_id("", at()).starts_with("pack-"));
    }

    #[test]
    fn company_name_from_url_variants() {
        assert_eq!(company_name_from_url("https://www.acme.io"), "Acme");
        assert_eq!(company_name_from_url("https://acmesaas.example.com/about"), "Acmesaas");
        assert_eq!(company_name_from_url("http://stripe.com"), "Stripe");
        assert_eq!(company_name_from_url("not a url"), FALLBACK_COMPANY_NAME);
        assert_eq!(company_name_from_url(""), FALLBACK_COMPANY_NAME);
        assert_eq!(company_name_from_url("mailto:hi@acme.io"), FALLBACK_COMPANY_NAME);
    }

    #[test]
    fn company_name_from_url_is_stable() {
        for url in ["https://www.acme.io", "garbage", "https://x.y.z"] {
            assert_eq!(company_name_from_url(url), company_name_from_url(url));
        }
    }

    #[test]
    fn summary_lists_present_sections() {
        let pack = assemble("https://acme.example", "Acme", extraction(), at());
        let expected = "# Acme Context Pack (v0)\n\
\n\
**Mission:** Make month-end boring\n\
\n\
## Ideal Customer Segments\n\
\n\
- **Finance teams**: Mid-market controllers\n\
\n\
## Jobs To Be Done\n\
\n\
- Close the books in a day\n\
\n\
_This is a draft (v0) built from public pages. Complete the founder interview to reach the next version._\n";
        assert_eq!(pack.summary, expected);
    }

    #[test]
    fn summary_omits_empty_sections() {
        let pack = assemble(
            "https://acme.example",
            "Acme",
            ExtractionResult::empty("no page content available"),
            at(),
        );
        assert!(pack.summary.starts_with("# Acme Context Pack (v0)\n"));
        assert!(!pack.summary.contains("Mission"));
        assert!(!pack.summary.contains("Vision"));
        assert!(!pack.summary.contains("##"));
        assert!(pack.summary.contains("founder interview"));
    }
}
