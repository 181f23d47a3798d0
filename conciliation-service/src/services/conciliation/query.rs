use super::balance::{member_of, round_total, signed_amount};
use super::{required, ConciliationService};
use crate::models::{
    is_invoice_doctype, Document, DocumentQuery, GroupFilter, GroupMember, ReconciliationGroup,
};
use crate::services::error::ConciliationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument, warn};

struct GroupAccumulator {
    documents: Vec<GroupMember>,
    total: Decimal,
    posting_date: NaiveDate,
}

impl ConciliationService {
    /// Rebuild every group of a party from the tags on its submitted
    /// documents, newest first.
    ///
    /// Payments allocated against a grouped invoice but not tagged themselves
    /// are listed next to that invoice's group with no group id. That lookup
    /// is advisory: if it fails the tagged groups are returned on their own.
    #[instrument(skip(self), fields(family = %self.family.as_str()))]
    pub async fn list_groups(
        &self,
        party: &str,
        company: &str,
    ) -> Result<Vec<ReconciliationGroup>, ConciliationError> {
        let result = self.list_groups_inner(party, company).await;
        self.observe("list", &result);
        result
    }

    async fn list_groups_inner(
        &self,
        party: &str,
        company: &str,
    ) -> Result<Vec<ReconciliationGroup>, ConciliationError> {
        let party = required(party, "party")?;
        let company = required(company, "company")?;

        let invoices = self
            .accessor
            .query(
                self.family.invoice_doctype(),
                &DocumentQuery::new()
                    .company(company)
                    .party(party)
                    .group(GroupFilter::Tagged)
                    .submitted(),
            )
            .await
            .map_err(ConciliationError::ExternalStore)?;

        let payments = self
            .accessor
            .query(
                self.family.payment_doctype(),
                &DocumentQuery::new()
                    .company(company)
                    .party(party)
                    .party_type(self.family.party_type())
                    .group(GroupFilter::Tagged)
                    .submitted(),
            )
            .await
            .map_err(ConciliationError::ExternalStore)?;

        // Ordered by group id so equal dates keep a stable order after sorting.
        let mut groups: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
        for doc in invoices.iter().chain(payments.iter()) {
            let Some(group_id) = doc.group_id.as_deref() else {
                continue;
            };
            let entry = groups
                .entry(group_id.to_string())
                .or_insert_with(|| GroupAccumulator {
                    documents: Vec::new(),
                    total: Decimal::ZERO,
                    posting_date: doc.posting_date,
                });
            entry.documents.push(member_of(doc, Some(group_id)));
            entry.total += signed_amount(doc);
            entry.posting_date = doc.posting_date;
        }

        match self
            .linked_payments(party, company, &invoices, &groups)
            .await
        {
            Ok(linked) => {
                for (group_id, member) in linked {
                    if let Some(entry) = groups.get_mut(&group_id) {
                        entry.documents.push(member);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Linked payment lookup failed, listing tagged documents only");
            }
        }

        let mut result: Vec<ReconciliationGroup> = groups
            .into_iter()
            .map(|(group_id, acc)| ReconciliationGroup {
                group_id,
                documents: acc.documents,
                total_amount: round_total(acc.total),
                posting_date: acc.posting_date,
            })
            .collect();
        result.sort_by(|a, b| b.posting_date.cmp(&a.posting_date));

        debug!(groups = result.len(), "Groups rebuilt");
        Ok(result)
    }

    /// Find untagged payments of the party whose allocations point at a
    /// grouped invoice. Returns `(group_id, member)` pairs to merge.
    async fn linked_payments(
        &self,
        party: &str,
        company: &str,
        invoices: &[Document],
        groups: &BTreeMap<String, GroupAccumulator>,
    ) -> Result<Vec<(String, GroupMember)>, ConciliationError> {
        let invoice_to_group: HashMap<&str, &str> = invoices
            .iter()
            .filter_map(|inv| inv.group_id.as_deref().map(|g| (inv.name.as_str(), g)))
            .collect();
        if invoice_to_group.is_empty() {
            return Ok(Vec::new());
        }

        let mut listed: HashSet<String> = groups
            .values()
            .flat_map(|acc| acc.documents.iter().map(|m| m.name.clone()))
            .collect();

        let payments = self
            .accessor
            .query(
                self.family.payment_doctype(),
                &DocumentQuery::new()
                    .company(company)
                    .party(party)
                    .party_type(self.family.party_type())
                    .submitted(),
            )
            .await
            .map_err(ConciliationError::ExternalStore)?;

        let mut linked = Vec::new();
        for payment in payments {
            if listed.contains(&payment.name) {
                continue;
            }

            let allocations = match payment.allocations.clone() {
                Some(allocations) => allocations,
                None => match self
                    .accessor
                    .fetch(&payment.doctype, &payment.name)
                    .await
                    .map_err(ConciliationError::ExternalStore)?
                {
                    Some(fresh) => fresh.allocations.unwrap_or_default(),
                    None => continue,
                },
            };

            let target = allocations.iter().find_map(|allocation| {
                if !is_invoice_doctype(&allocation.reference_kind) {
                    return None;
                }
                invoice_to_group
                    .get(allocation.reference_name.as_str())
                    .copied()
            });

            if let Some(group_id) = target {
                listed.insert(payment.name.clone());
                linked.push((group_id.to_string(), member_of(&payment, None)));
            }
        }

        Ok(linked)
    }
}
