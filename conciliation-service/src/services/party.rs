//! Party name equivalence.
//!
//! ERPNext sites frequently hold the same customer or supplier under two
//! names: the plain one and one suffixed with the company abbreviation
//! (`"Juan Perez - ACME"`). Both must be accepted as the same party.

use crate::services::erpnext::ErpNextClient;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartyError {
    #[error("Company {0} not found")]
    UnknownCompany(String),

    #[error(transparent)]
    Lookup(#[from] anyhow::Error),
}

#[async_trait]
pub trait PartyResolver: Send + Sync {
    /// Names to treat as equal to `party` within `company`. Always contains `party`.
    async fn equivalent_names(
        &self,
        party: &str,
        company: &str,
    ) -> Result<HashSet<String>, PartyError>;
}

/// Expand a party name into its plain and abbreviation-suffixed forms.
pub fn party_variants(party: &str, company_abbr: Option<&str>) -> HashSet<String> {
    let mut names = HashSet::new();
    let party = party.trim();
    names.insert(party.to_string());

    if let Some(abbr) = company_abbr.map(str::trim).filter(|a| !a.is_empty()) {
        let suffix = format!(" - {}", abbr);
        match party.strip_suffix(&suffix) {
            Some(base) if !base.trim().is_empty() => {
                names.insert(base.trim().to_string());
            }
            Some(_) => {}
            None => {
                names.insert(format!("{}{}", party, suffix));
            }
        }
    }

    names
}

/// Resolves equivalence using the company's abbreviation stored in ERPNext.
#[derive(Clone)]
pub struct ErpNextPartyResolver {
    client: ErpNextClient,
}

impl ErpNextPartyResolver {
    pub fn new(client: ErpNextClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartyResolver for ErpNextPartyResolver {
    async fn equivalent_names(
        &self,
        party: &str,
        company: &str,
    ) -> Result<HashSet<String>, PartyError> {
        let abbr = self
            .client
            .company_abbr(company)
            .await?
            .ok_or_else(|| PartyError::UnknownCompany(company.to_string()))?;
        if abbr.trim().is_empty() {
            tracing::debug!(company = %company, "Company has no abbreviation; exact party match only");
        }
        Ok(party_variants(party, Some(&abbr)))
    }
}
