//! CV-Library extraction profile

use crate::domain::EmploymentType;
use crate::scrapers::profile::SiteProfile;

pub static CVLIBRARY: SiteProfile = SiteProfile {
    name: "cvlibrary",
    base_url: "https://www.cv-library.co.uk",
    search_path: "/search-jobs",
    keywords_param: "q",
    location_param: "geo",
    radius_param: "distance",
    extra_params: &[],
    employment_param: Some("jt"),
    // CV-Library wants capitalized labels
    employment_vocabulary: &[
        (EmploymentType::Permanent, "Permanent"),
        (EmploymentType::Contract, "Contract"),
        (EmploymentType::Temporary, "Temporary"),
    ],
    card_selectors: &[".results__item", ".job-card", "article[data-job-id]"],
    title_selectors: &[
        ".job__title a",
        "h2 a",
        ".results__title a",
        "a[data-job-title]",
    ],
    company_selectors: &[".job__company", ".results__company", "[data-company-name]"],
    location_selectors: &[".job__location", ".results__location", "[data-location]"],
    salary_selectors: &[".job__salary", ".results__salary", "[data-salary]"],
    snippet_selectors: &[
        ".job__description",
        ".results__description",
        ".job-card__snippet",
    ],
    posted_selectors: &[".job__posted", ".results__posted", "[data-posted-date]"],
    job_type_selectors: &[".job__type", ".results__type", "[data-job-type]"],
    next_page_selectors: &[
        "a.pagination__link--next",
        "a[rel=\"next\"]",
        ".pagination__next a",
    ],
};
