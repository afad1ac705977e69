//! Full-description backfill over impersonated HTTP
//!
//! Listing cards only carry snippets; this fetcher pulls the job's own page
//! through a plain HTTP GET that impersonates a real browser's TLS
//! fingerprint, then runs a layered extraction cascade over the HTML.
//! Different fingerprints succeed on different sources unpredictably, so
//! every profile is tried exhaustively before giving up, and a single
//! profile's network error never short-circuits the rest.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::infrastructure::config::DescriptionFetchConfig;

/// Ordered TLS/browser impersonation profiles, first preference first.
const EMULATIONS: &[wreq_util::Emulation] = &[
    wreq_util::Emulation::Chrome131,
    wreq_util::Emulation::Chrome120,
    wreq_util::Emulation::Chrome110,
    wreq_util::Emulation::Edge127,
];

/// Browser-like default headers.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("Accept-Language", "en-GB,en;q=0.9,en-US;q=0.8"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
];

const MAX_REDIRECTS: usize = 3;

/// Minimum length for structured-metadata and selector extractions.
const MIN_SELECTOR_CHARS: usize = 200;
/// Minimum length for the whole-body fallback.
const MIN_BODY_CHARS: usize = 500;

/// Site-specific description selectors, tried before the generic ones.
fn site_selectors(source: &str) -> &'static [&'static str] {
    match source {
        "totaljobs" => &[
            "[data-at=\"job-description\"]",
            "[data-genesis-element=\"TEXT\"]",
            "span[data-genesis-element=\"TEXT\"]",
            "[class*=\"job-ad-display\"]",
        ],
        "reed" => &[
            "[data-qa=\"job-description\"]",
            ".job-description",
            ".description",
            "[itemprop=\"description\"]",
            ".job-details-description",
            "#job-description",
        ],
        "indeed" => &[
            "#jobDescriptionText",
            ".jobsearch-jobDescriptionText",
            "[data-testid=\"jobDescriptionText\"]",
            ".job-description",
            "#jobDescription",
        ],
        "cvlibrary" => &[
            ".job-description",
            ".job__description",
            "[class*=\"job-description\"]",
            ".vacancy-description",
            "#job-description",
        ],
        _ => &[],
    }
}

const GENERIC_SELECTORS: &[&str] = &[
    "[data-at=\"job-description\"]",
    "[class*=\"job-description\"]",
    "[class*=\"jobDescription\"]",
    ".description",
    "#description",
];

/// The secondary, lighter-weight fetch path for description backfill.
pub struct DescriptionFetcher {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    timeout: Duration,
}

impl DescriptionFetcher {
    pub fn new(config: &DescriptionFetchConfig) -> Self {
        let per_second = NonZeroU32::new(config.max_requests_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Fetch the full description behind a job URL, or `None` when every
    /// impersonation profile and cascade step came up empty.
    pub async fn fetch_description(&self, url: &str, source_hint: Option<&str>) -> Option<String> {
        if url.is_empty() {
            return None;
        }

        let source = source_hint
            .map(str::to_string)
            .or_else(|| detect_source(url));
        debug!("Fetching description from {} (source: {:?})", url, source);

        self.limiter.until_ready().await;

        for emulation in EMULATIONS {
            match self.fetch_with_emulation(url, *emulation).await {
                Some(body) => {
                    if let Some(description) = extract_description(&body, source.as_deref()) {
                        info!(
                            "Fetched description ({} chars) via {:?}",
                            description.len(),
                            emulation
                        );
                        return Some(description);
                    }
                    debug!("Got a body with {:?} but nothing extractable", emulation);
                }
                None => debug!("No usable response with {:?}", emulation),
            }
        }

        warn!("Failed to fetch description from {} with any profile", url);
        None
    }

    /// One GET under one impersonation profile, following redirects manually
    /// up to a bound.
    async fn fetch_with_emulation(
        &self,
        url: &str,
        emulation: wreq_util::Emulation,
    ) -> Option<String> {
        let client = wreq::Client::builder()
            .emulation(emulation)
            .timeout(self.timeout)
            .build()
            .ok()?;

        let mut current_url = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let mut request = client.get(&current_url);
            for (name, value) in DEFAULT_HEADERS {
                request = request.header(*name, *value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Request error on {}: {}", current_url, e);
                    return None;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.text().await.ok();
            }

            let code = status.as_u16();
            if (300..400).contains(&code) {
                let next = response
                    .headers()
                    .get("location")
                    .and_then(|value| value.to_str().ok())
                    .map(|location| {
                        Url::parse(&current_url)
                            .and_then(|base| base.join(location))
                            .map(|joined| joined.to_string())
                            .unwrap_or_else(|_| location.to_string())
                    });
                match next {
                    Some(next_url) => {
                        debug!("Redirect {} -> {}", current_url, next_url);
                        current_url = next_url;
                        continue;
                    }
                    None => return None,
                }
            }

            debug!("Got status {} on {}", code, current_url);
            return None;
        }

        debug!("Exceeded redirect limit starting from {}", url);
        None
    }
}

/// Which adapter a job URL belongs to, by host.
pub fn detect_source(url: &str) -> Option<String> {
    let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
    if host.contains("totaljobs") {
        Some("totaljobs".to_string())
    } else if host.contains("reed") {
        Some("reed".to_string())
    } else if host.contains("indeed") {
        Some("indeed".to_string())
    } else if host.contains("cv-library") || host.contains("cvlibrary") {
        Some("cvlibrary".to_string())
    } else {
        None
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip tags and entities from an HTML snippet. html5ever decodes entities
/// during parsing, so text collection covers both.
fn strip_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    collapse_whitespace(&fragment.root_element().text().collect::<String>())
}

/// Extraction cascade over one fetched page.
///
/// Order: embedded JobPosting metadata (the most stable signal), then
/// site-specific selectors, then generic selectors, then the stripped page
/// body. Selector steps keep the *largest* matched block, since descriptions
/// are often duplicated across nested elements and size disambiguates where
/// position cannot.
pub fn extract_description(html: &str, source: Option<&str>) -> Option<String> {
    let document = Html::parse_document(html);

    if let Some(description) = extract_from_json_ld(&document) {
        debug!("Extracted description from structured metadata ({} chars)", description.len());
        return Some(description);
    }

    let mut selectors: Vec<&str> = source.map(site_selectors).unwrap_or(&[]).to_vec();
    for generic in GENERIC_SELECTORS {
        if !selectors.contains(generic) {
            selectors.push(generic);
        }
    }

    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        let largest = document
            .select(&selector)
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .max_by_key(String::len)
            .unwrap_or_default();

        if largest.len() > MIN_SELECTOR_CHARS {
            debug!(
                "Extracted description from '{}' ({} chars)",
                selector_str,
                largest.len()
            );
            return Some(largest);
        }
    }

    let body = body_text_stripped(&document);
    if body.len() > MIN_BODY_CHARS {
        debug!("Extracted description from body fallback ({} chars)", body.len());
        return Some(body);
    }

    None
}

/// Pull a JobPosting description out of JSON-LD blocks, handling bare
/// objects, arrays and @graph containers.
fn extract_from_json_ld(document: &Html) -> Option<String> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;

    for script in document.select(&selector) {
        let raw = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };

        let candidates: Vec<&serde_json::Value> = match &data {
            serde_json::Value::Array(items) => items.iter().collect(),
            serde_json::Value::Object(map) => match map.get("@graph").and_then(|g| g.as_array()) {
                Some(graph) => graph.iter().collect(),
                None => vec![&data],
            },
            _ => continue,
        };

        for item in candidates {
            let is_job_posting = item.get("@type").and_then(|t| t.as_str()) == Some("JobPosting");
            if !is_job_posting {
                continue;
            }
            if let Some(raw_description) = item.get("description").and_then(|d| d.as_str()) {
                let cleaned = strip_html(raw_description);
                if cleaned.len() > MIN_SELECTOR_CHARS {
                    return Some(cleaned);
                }
            }
        }
    }

    None
}

/// Body text with script/style/nav/header/footer subtrees removed.
fn body_text_stripped(document: &Html) -> String {
    let Ok(body_selector) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut text = String::new();
    for node in body.descendants() {
        if let Some(fragment) = node.value().as_text() {
            let excluded = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|element| {
                    matches!(
                        element.name(),
                        "script" | "style" | "nav" | "header" | "footer"
                    )
                })
            });
            if !excluded {
                text.push_str(fragment);
                text.push(' ');
            }
        }
    }

    collapse_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(words: usize) -> String {
        vec!["lorem"; words].join(" ")
    }

    #[test]
    fn detects_sources_from_hosts() {
        assert_eq!(
            detect_source("https://www.totaljobs.com/job/123").as_deref(),
            Some("totaljobs")
        );
        assert_eq!(
            detect_source("https://www.cv-library.co.uk/job/9").as_deref(),
            Some("cvlibrary")
        );
        assert_eq!(detect_source("https://uk.indeed.com/viewjob?jk=1").as_deref(), Some("indeed"));
        assert_eq!(detect_source("https://example.com/x"), None);
        assert_eq!(detect_source("not a url"), None);
    }

    #[test]
    fn structured_metadata_wins_over_selectors() {
        let description = filler(60);
        let html = format!(
            r#"<html><head>
                 <script type="application/ld+json">
                   {{"@type":"JobPosting","description":"<p>{description} &amp; more</p>"}}
                 </script>
               </head>
               <body><div class="job-description">{}</div></body></html>"#,
            filler(80)
        );
        let result = extract_description(&html, Some("reed")).unwrap();
        assert!(result.starts_with("lorem"));
        // Entities and tags are stripped
        assert!(result.contains("& more"));
        assert!(!result.contains("<p>"));
    }

    #[test]
    fn short_structured_metadata_falls_through() {
        let html = format!(
            r#"<html><head>
                 <script type="application/ld+json">{{"@type":"JobPosting","description":"tiny"}}</script>
               </head>
               <body><div class="job-description">{}</div></body></html>"#,
            filler(80)
        );
        let result = extract_description(&html, Some("reed")).unwrap();
        assert!(result.len() > MIN_SELECTOR_CHARS);
        assert_ne!(result, "tiny");
    }

    #[test]
    fn json_ld_graph_container_is_searched() {
        let description = filler(60);
        let html = format!(
            r#"<html><head><script type="application/ld+json">
                 {{"@graph":[{{"@type":"WebSite"}},{{"@type":"JobPosting","description":"{description}"}}]}}
               </script></head><body></body></html>"#
        );
        assert!(extract_description(&html, None).is_some());
    }

    #[test]
    fn generic_selector_match_does_not_escalate_to_body() {
        // Only a generic selector matches: no structured metadata, no
        // site-specific selectors (source unknown). The cascade must return
        // that match, not the whole-body fallback.
        let target = filler(60);
        let html = format!(
            r#"<html><body>
                 <p>unrelated page furniture repeated over and over {}</p>
                 <div class="description">{target}</div>
               </body></html>"#,
            filler(200)
        );
        let result = extract_description(&html, None).unwrap();
        assert_eq!(result, target);
        assert!(!result.contains("furniture"));
    }

    #[test]
    fn largest_block_wins_among_duplicated_matches() {
        let small = filler(55);
        let large = format!("{} extra tail content", filler(80));
        let html = format!(
            r#"<html><body>
                 <div class="job-description">{small}</div>
                 <div class="job-description">{large}</div>
               </body></html>"#
        );
        let result = extract_description(&html, Some("cvlibrary")).unwrap();
        assert!(result.contains("extra tail content"));
    }

    #[test]
    fn body_fallback_strips_chrome_elements() {
        let html = format!(
            r#"<html><body>
                 <nav>navigation junk</nav>
                 <header>header junk</header>
                 <script>var x = "script junk";</script>
                 <main>{}</main>
                 <footer>footer junk</footer>
               </body></html>"#,
            filler(150)
        );
        let result = extract_description(&html, None).unwrap();
        assert!(result.contains("lorem"));
        assert!(!result.contains("junk"));
    }

    #[test]
    fn empty_page_yields_none() {
        assert_eq!(extract_description("<html><body><p>hi</p></body></html>", None), None);
    }
}
