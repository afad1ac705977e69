//! Per-source extraction profiles
//!
//! Each job site gets one immutable [`SiteProfile`] value: its query-string
//! layout, its employment-type dialect and the CSS selector candidates for
//! every field the cards expose. Sources render markup inconsistently across
//! templates, so every field carries a candidate list and the first match
//! wins. Profiles are plain `'static` values shared freely across concurrent
//! scrape tasks.

use url::Url;

use crate::domain::EmploymentType;

/// Everything the pagination engine needs to know about one source.
#[derive(Debug)]
pub struct SiteProfile {
    /// Adapter name recorded on every scraped record ("reed", "indeed", ...)
    pub name: &'static str,
    pub base_url: &'static str,
    /// Path of the search endpoint, e.g. "/jobs"
    pub search_path: &'static str,
    pub keywords_param: &'static str,
    pub location_param: &'static str,
    pub radius_param: &'static str,
    /// Fixed query parameters this source always wants (sort order etc.)
    pub extra_params: &'static [(&'static str, &'static str)],
    /// Query parameter for the employment-type filter; None for sources
    /// without one (those rely on the card-level heuristic instead)
    pub employment_param: Option<&'static str>,
    /// Canonical vocabulary mapped onto this site's own labels
    pub employment_vocabulary: &'static [(EmploymentType, &'static str)],
    pub card_selectors: &'static [&'static str],
    /// Title candidates; these should match the card's link element
    pub title_selectors: &'static [&'static str],
    pub company_selectors: &'static [&'static str],
    pub location_selectors: &'static [&'static str],
    pub salary_selectors: &'static [&'static str],
    pub snippet_selectors: &'static [&'static str],
    pub posted_selectors: &'static [&'static str],
    pub job_type_selectors: &'static [&'static str],
    pub next_page_selectors: &'static [&'static str],
}

impl SiteProfile {
    /// Build the search URL for one query. The first canonical employment
    /// type this site's vocabulary can express is applied; the rest fall back
    /// to the extraction heuristic, as does everything on sites without a
    /// filter parameter.
    pub fn search_url(
        &self,
        keywords: &str,
        location: &str,
        radius: u32,
        employment_types: &[EmploymentType],
    ) -> String {
        let mut url = Url::parse(self.base_url).expect("profile base_url is valid");
        url.set_path(self.search_path);

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(self.keywords_param, keywords);
            pairs.append_pair(self.location_param, location);
            pairs.append_pair(self.radius_param, &radius.to_string());
            for (key, value) in self.extra_params {
                pairs.append_pair(key, value);
            }
            if let Some(param) = self.employment_param {
                if let Some(site_value) = self.site_employment_value(employment_types) {
                    pairs.append_pair(param, site_value);
                }
            }
        }

        url.to_string()
    }

    /// Translate the first mappable canonical type into this site's dialect.
    pub fn site_employment_value(
        &self,
        employment_types: &[EmploymentType],
    ) -> Option<&'static str> {
        for requested in employment_types {
            for &(canonical, site_value) in self.employment_vocabulary {
                if canonical == *requested {
                    return Some(site_value);
                }
            }
        }
        None
    }

    /// Absolute-ize a possibly relative href against this site's base URL.
    pub fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            match Url::parse(self.base_url).and_then(|base| base.join(href)) {
                Ok(url) => url.to_string(),
                Err(_) => format!("{}{}", self.base_url, href),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::{cvlibrary, indeed, reed};

    #[test]
    fn search_url_carries_query_and_fixed_params() {
        let url = indeed::INDEED.search_url("python ai", "Manchester", 10, &[]);
        assert!(url.starts_with("https://uk.indeed.com/jobs?"));
        assert!(url.contains("q=python+ai"));
        assert!(url.contains("l=Manchester"));
        assert!(url.contains("radius=10"));
        assert!(url.contains("sort=date"));
    }

    #[test]
    fn employment_filter_uses_first_mappable_type() {
        // wfh has no site-side filter anywhere; contract is the first type
        // indeed can express
        let types = [EmploymentType::Wfh, EmploymentType::Contract];
        assert_eq!(indeed::INDEED.site_employment_value(&types), Some("contract"));
        let url = indeed::INDEED.search_url("python", "Remote", 0, &types);
        assert!(url.contains("jt=contract"));

        // cvlibrary speaks capitalized labels
        assert_eq!(
            cvlibrary::CVLIBRARY.site_employment_value(&[EmploymentType::Temporary]),
            Some("Temporary")
        );
    }

    #[test]
    fn sites_without_filter_param_ignore_employment_types() {
        let url = reed::REED.search_url("python", "Leeds", 10, &[EmploymentType::Contract]);
        assert!(!url.contains("contract"));
    }

    #[test]
    fn absolutize_joins_relative_hrefs() {
        assert_eq!(
            reed::REED.absolutize("/jobs/12345"),
            "https://www.reed.co.uk/jobs/12345"
        );
        assert_eq!(
            reed::REED.absolutize("https://elsewhere.example/x"),
            "https://elsewhere.example/x"
        );
    }
}
