//! Indeed extraction profile
//!
//! Indeed's anti-bot measures are the most aggressive of the supported
//! sources; the fetch layer's pacing and fingerprinting carry most of the
//! weight, and the selector lists here are wide because its markup varies a
//! lot between templates.

use crate::domain::EmploymentType;
use crate::scrapers::profile::SiteProfile;

pub static INDEED: SiteProfile = SiteProfile {
    name: "indeed",
    base_url: "https://uk.indeed.com",
    search_path: "/jobs",
    keywords_param: "q",
    location_param: "l",
    radius_param: "radius",
    // newest first
    extra_params: &[("sort", "date")],
    employment_param: Some("jt"),
    employment_vocabulary: &[
        (EmploymentType::Permanent, "permanent"),
        (EmploymentType::Contract, "contract"),
        (EmploymentType::Temporary, "temporary"),
    ],
    card_selectors: &[".job_seen_beacon", "[data-jk]", ".jobsearch-ResultsList > li"],
    title_selectors: &["h2.jobTitle a", ".jobTitle a", "a[data-jk]", "h2 a"],
    company_selectors: &[
        "[data-testid=\"company-name\"]",
        ".companyName",
        ".company",
    ],
    location_selectors: &[
        "[data-testid=\"text-location\"]",
        ".companyLocation",
        ".location",
    ],
    salary_selectors: &[
        "[data-testid=\"attribute_snippet_testid\"]",
        ".salary-snippet-container",
        ".metadata .salary-snippet-container",
    ],
    snippet_selectors: &[".job-snippet", "[data-testid=\"jobDescriptionText\"]"],
    posted_selectors: &[".date", "[data-testid=\"myJobsStateDate\"]"],
    job_type_selectors: &[".metadata div", ".jobMetaDataGroup"],
    next_page_selectors: &[
        "a[data-testid=\"pagination-page-next\"]",
        "a[aria-label=\"Next Page\"]",
        "nav[aria-label=\"pagination\"] a:last-child",
    ],
};
