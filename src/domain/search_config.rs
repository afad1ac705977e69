//! Saved search configurations driving the scrape stage

use serde::{Deserialize, Serialize};

use crate::domain::job::EmploymentType;

/// A named search the scrape stage runs against every enabled source.
///
/// Created by seed defaults or the external CRUD layer; the pipeline itself
/// only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub id: Option<i64>,
    pub name: String,
    pub keywords: String,
    pub location: String,
    /// Search radius in miles; 0 for location-less searches such as "Remote"
    pub radius: u32,
    /// Comma-encoded canonical employment types, e.g. "contract,permanent,wfh"
    pub employment_types: String,
    pub enabled: bool,
}

impl SearchConfig {
    pub fn new(
        name: impl Into<String>,
        keywords: impl Into<String>,
        location: impl Into<String>,
        radius: u32,
        employment_types: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            keywords: keywords.into(),
            location: location.into(),
            radius,
            employment_types: employment_types.into(),
            enabled: true,
        }
    }

    /// Decode the comma-encoded employment-type set, dropping labels that are
    /// not part of the canonical vocabulary.
    pub fn employment_type_list(&self) -> Vec<EmploymentType> {
        self.employment_types
            .split(',')
            .filter_map(EmploymentType::parse)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_comma_encoded_employment_types() {
        let config = SearchConfig::new("t", "python", "Remote", 0, "contract,permanent,wfh");
        assert_eq!(
            config.employment_type_list(),
            vec![
                EmploymentType::Contract,
                EmploymentType::Permanent,
                EmploymentType::Wfh
            ]
        );
    }

    #[test]
    fn unknown_labels_are_dropped() {
        let config = SearchConfig::new("t", "python", "Leeds", 10, "contract,unicorn,");
        assert_eq!(config.employment_type_list(), vec![EmploymentType::Contract]);
    }
}
