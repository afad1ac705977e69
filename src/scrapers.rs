//! Site extraction adapters
//!
//! One immutable profile per supported source plus the shared pagination
//! engine that runs them. Adding a source means adding a profile module and
//! registering it here.

pub mod cvlibrary;
pub mod engine;
pub mod indeed;
pub mod profile;
pub mod reed;
pub mod totaljobs;

pub use engine::{ScrapeOutcome, SiteScraper};
pub use profile::SiteProfile;

/// Every supported source, in the order the scrape stage runs them.
pub fn all_profiles() -> [&'static SiteProfile; 4] {
    [
        &reed::REED,
        &indeed::INDEED,
        &cvlibrary::CVLIBRARY,
        &totaljobs::TOTALJOBS,
    ]
}

/// Look up a profile by adapter name.
pub fn profile_for(name: &str) -> Option<&'static SiteProfile> {
    all_profiles()
        .into_iter()
        .find(|profile| profile.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_sources() {
        for name in ["reed", "indeed", "cvlibrary", "totaljobs"] {
            assert!(profile_for(name).is_some(), "missing profile for {name}");
        }
        assert!(profile_for("Reed").is_some());
        assert!(profile_for("monster").is_none());
    }
}
