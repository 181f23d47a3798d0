use super::kinds::{resolve_reference, Resolution};
use super::{generate_group_id, required, ConciliationService};
use crate::models::{
    AssignedDocument, AssignmentOutcome, Document, DocumentKind, DocumentQuery, DocumentRef,
    GroupFilter,
};
use crate::services::error::ConciliationError;
use crate::services::metrics::record_tag_writes;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

impl ConciliationService {
    /// Tag a set of documents with a new group id, or with `existing_group_id`
    /// to extend a group.
    ///
    /// Every reference is resolved and validated before the first write, so
    /// validation and not-found failures leave the store untouched. A store
    /// failure during the write phase leaves earlier documents tagged.
    #[instrument(
        skip(self, references),
        fields(family = %self.family.as_str(), references = references.len())
    )]
    pub async fn assign(
        &self,
        party: &str,
        company: &str,
        references: &[DocumentRef],
        existing_group_id: Option<&str>,
    ) -> Result<AssignmentOutcome, ConciliationError> {
        let result = self
            .assign_inner(party, company, references, existing_group_id)
            .await;
        self.observe("assign", &result);
        result
    }

    async fn assign_inner(
        &self,
        party: &str,
        company: &str,
        references: &[DocumentRef],
        existing_group_id: Option<&str>,
    ) -> Result<AssignmentOutcome, ConciliationError> {
        let party = required(party, "party")?;
        let company = required(company, "company")?;
        let references = dedupe_references(references)?;
        let existing_group_id = existing_group_id
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match existing_group_id {
            None if references.len() < 2 => {
                return Err(ConciliationError::validation(
                    "Select at least two documents to reconcile",
                ));
            }
            Some(_) if references.is_empty() => {
                return Err(ConciliationError::validation(
                    "Select at least one document to add to the group",
                ));
            }
            _ => {}
        }

        let equivalents = self.equivalent_parties(party, company).await?;

        let group_id = match existing_group_id {
            None => generate_group_id(self.family.id_prefix()),
            Some(id) => {
                self.ensure_group_belongs(id, party, company, &equivalents)
                    .await?;
                id.to_string()
            }
        };

        let mut validated = Vec::with_capacity(references.len());
        for reference in &references {
            let doc = match resolve_reference(&*self.accessor, self.family, reference).await? {
                Resolution::Resolved(doc) => doc,
                Resolution::Unresolved { tried } => {
                    let tried: Vec<&str> = tried.iter().map(|k| self.family.doctype(*k)).collect();
                    return Err(ConciliationError::not_found(format!(
                        "Document {} not found (tried {})",
                        reference.voucher_no,
                        tried.join(", ")
                    )));
                }
            };
            self.validate_member(&doc, party, company, &equivalents)?;
            validated.push(doc);
        }

        let mut documents = Vec::with_capacity(validated.len());
        for doc in validated {
            if let Some(previous) = doc.group_id.as_deref().filter(|g| *g != group_id) {
                warn!(
                    document = %doc.name,
                    previous_group = %previous,
                    group_id = %group_id,
                    "Moving document to another group"
                );
            }

            if let Err(e) = self
                .accessor
                .set_group(&doc.doctype, &doc.name, Some(&group_id))
                .await
            {
                tracing::error!(
                    document = %doc.name,
                    group_id = %group_id,
                    tagged = documents.len(),
                    error = %e,
                    "Tag write failed, group left partially assigned"
                );
                record_tag_writes(self.family.as_str(), "tagged", documents.len());
                return Err(ConciliationError::ExternalStore(e));
            }

            let label = doc.label();
            documents.push(AssignedDocument {
                name: doc.name.clone(),
                kind: doc.kind,
                label,
                display_label: label.display_name(),
                posting_date: doc.posting_date,
                amount: doc.open_amount(),
                group_id: group_id.clone(),
            });
        }

        record_tag_writes(self.family.as_str(), "tagged", documents.len());
        self.notify_cache().await;

        info!(
            group_id = %group_id,
            created = existing_group_id.is_none(),
            count = documents.len(),
            "Documents assigned to group"
        );

        Ok(AssignmentOutcome {
            group_id,
            created: existing_group_id.is_none(),
            documents,
        })
    }

    /// An existing group must already hold at least one document of this
    /// party and company.
    async fn ensure_group_belongs(
        &self,
        group_id: &str,
        party: &str,
        company: &str,
        equivalents: &HashSet<String>,
    ) -> Result<(), ConciliationError> {
        for kind in self.family.candidate_kinds() {
            let mut query = DocumentQuery::new()
                .company(company)
                .group(GroupFilter::Equals(group_id.to_string()));
            if kind == DocumentKind::Payment {
                query = query.party_type(self.family.party_type());
            }

            let tagged = self
                .accessor
                .query(self.family.doctype(kind), &query)
                .await
                .map_err(ConciliationError::ExternalStore)?;

            if tagged.iter().any(|doc| equivalents.contains(&doc.party)) {
                return Ok(());
            }
        }

        Err(ConciliationError::not_found(format!(
            "Group {} not found for party {} in company {}",
            group_id, party, company
        )))
    }

    fn validate_member(
        &self,
        doc: &Document,
        party: &str,
        company: &str,
        equivalents: &HashSet<String>,
    ) -> Result<(), ConciliationError> {
        if !doc.submitted {
            return Err(ConciliationError::invalid_document(
                &doc.name,
                format!("Document {} is not submitted", doc.name),
            ));
        }

        if doc.company != company {
            return Err(ConciliationError::invalid_document(
                &doc.name,
                format!(
                    "Document {} belongs to company {}, not {}",
                    doc.name, doc.company, company
                ),
            ));
        }

        if doc.kind == DocumentKind::Payment
            && doc.party_type.as_deref() != Some(self.family.party_type())
        {
            return Err(ConciliationError::invalid_document(
                &doc.name,
                format!(
                    "Payment {} is not a {} payment",
                    doc.name,
                    self.family.party_type()
                ),
            ));
        }

        if !equivalents.contains(&doc.party) {
            return Err(ConciliationError::invalid_document(
                &doc.name,
                format!(
                    "Document {} belongs to {}, not {}",
                    doc.name, doc.party, party
                ),
            ));
        }

        Ok(())
    }
}

/// Drop repeated voucher numbers, keeping the first occurrence and its hint.
fn dedupe_references(references: &[DocumentRef]) -> Result<Vec<DocumentRef>, ConciliationError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(references.len());

    for reference in references {
        let voucher_no = reference.voucher_no.trim();
        if voucher_no.is_empty() {
            return Err(ConciliationError::validation("voucher_no is required"));
        }
        if seen.insert(voucher_no.to_string()) {
            unique.push(DocumentRef {
                voucher_no: voucher_no.to_string(),
                voucher_type: reference.voucher_type.clone(),
            });
        }
    }

    Ok(unique)
}
