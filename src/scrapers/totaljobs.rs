//! TotalJobs extraction profile
//!
//! TotalJobs marks everything with data-at attributes, which makes it the
//! most stable of the supported sources to extract from. No employment
//! filter parameter exists; the heuristic covers it.

use crate::scrapers::profile::SiteProfile;

pub static TOTALJOBS: SiteProfile = SiteProfile {
    name: "totaljobs",
    base_url: "https://www.totaljobs.com",
    search_path: "/jobs",
    keywords_param: "q",
    location_param: "l",
    radius_param: "radius",
    // relevance sort
    extra_params: &[("s", "1")],
    employment_param: None,
    employment_vocabulary: &[],
    card_selectors: &["[data-at=\"job-item\"]"],
    title_selectors: &["a[data-at=\"job-item-title\"]", "[data-at=\"job-item-title\"]"],
    company_selectors: &["[data-at=\"job-item-company-name\"]"],
    location_selectors: &["[data-at=\"job-item-location\"]"],
    salary_selectors: &["[data-at=\"job-item-salary-info\"]"],
    snippet_selectors: &["[data-at=\"jobcard-content\"]"],
    posted_selectors: &["[data-at=\"job-item-timeago\"]"],
    job_type_selectors: &["[data-at=\"job-item-job-type\"]"],
    next_page_selectors: &["a[data-at=\"pagination-next\"]", "a[rel=\"next\"]"],
};
