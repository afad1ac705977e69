//! Reed.co.uk extraction profile
//!
//! Reed has no usable employment-type query parameter; filtering relies on
//! the card-level heuristic instead.

use crate::scrapers::profile::SiteProfile;

pub static REED: SiteProfile = SiteProfile {
    name: "reed",
    base_url: "https://www.reed.co.uk",
    search_path: "/jobs",
    keywords_param: "keywords",
    location_param: "location",
    radius_param: "proximity",
    extra_params: &[],
    employment_param: None,
    employment_vocabulary: &[],
    card_selectors: &["article[data-qa=\"job-card\"]"],
    title_selectors: &[
        "h2 a",
        "h3 a",
        "[data-qa=\"job-card-title\"] a",
    ],
    company_selectors: &["[data-qa=\"job-card-company\"]", ".job-card__company"],
    location_selectors: &["[data-qa=\"job-card-location\"]", ".job-card__location"],
    salary_selectors: &["[data-qa=\"job-card-salary\"]", ".job-card__salary"],
    snippet_selectors: &["[data-qa=\"job-card-description\"]", ".job-card__description"],
    posted_selectors: &["[data-qa=\"job-card-posted-date\"]", ".job-card__posted-by"],
    job_type_selectors: &["[data-qa=\"job-card-contract-type\"]"],
    next_page_selectors: &[
        "a[data-qa=\"pagination-next\"]",
        "a[rel=\"next\"]",
        "a[href*=\"pageno=\"]",
    ],
};
