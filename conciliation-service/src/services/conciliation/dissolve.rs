use super::{required, ConciliationService};
use crate::models::{
    is_invoice_doctype, AllocationReference, DissolveOutcome, Document, DocumentQuery,
    GroupFilter, UnsafePayment,
};
use crate::services::error::ConciliationError;
use crate::services::metrics::{record_tag_writes, record_unsafe_payments};
use std::collections::HashSet;
use tracing::{error, info, instrument, warn};

impl ConciliationService {
    /// Clear the group tag from every document of a group.
    ///
    /// A payment allocated against an invoice outside the group is unsafe to
    /// release. Without `force`, any unsafe payment aborts the call before
    /// the first write. With `force`, everything is cleared and the unsafe
    /// payments are still reported. Allocation data is never touched.
    ///
    /// Only submitted documents belong to a group, matching what
    /// `list_groups` shows; drafts and cancelled documents keep their tag.
    #[instrument(skip(self), fields(family = %self.family.as_str()))]
    pub async fn dissolve(
        &self,
        group_id: &str,
        force: bool,
    ) -> Result<DissolveOutcome, ConciliationError> {
        let result = self.dissolve_inner(group_id, force).await;
        self.observe("dissolve", &result);
        result
    }

    async fn dissolve_inner(
        &self,
        group_id: &str,
        force: bool,
    ) -> Result<DissolveOutcome, ConciliationError> {
        let group_id = required(group_id, "group_id")?;
        let tagged = GroupFilter::Equals(group_id.to_string());

        let invoices = self
            .accessor
            .query(
                self.family.invoice_doctype(),
                &DocumentQuery::new().submitted().group(tagged.clone()),
            )
            .await
            .map_err(ConciliationError::ExternalStore)?;

        let payments = self
            .accessor
            .query(
                self.family.payment_doctype(),
                &DocumentQuery::new()
                    .party_type(self.family.party_type())
                    .submitted()
                    .group(tagged),
            )
            .await
            .map_err(ConciliationError::ExternalStore)?;

        if invoices.is_empty() && payments.is_empty() {
            return Err(ConciliationError::not_found(format!(
                "Group {} not found",
                group_id
            )));
        }

        let invoices_in_group: HashSet<&str> = invoices.iter().map(|i| i.name.as_str()).collect();

        let mut unsafe_payments = Vec::new();
        for payment in &payments {
            let external = self
                .external_allocations(payment, &invoices_in_group)
                .await?;
            if !external.is_empty() {
                unsafe_payments.push(UnsafePayment {
                    payment: payment.name.clone(),
                    external_allocations: external,
                });
            }
        }

        if !unsafe_payments.is_empty() {
            record_unsafe_payments(self.family.as_str(), force, unsafe_payments.len());
            if !force {
                warn!(
                    group_id = %group_id,
                    unsafe_payments = unsafe_payments.len(),
                    "Dissolve refused, payments allocated outside the group"
                );
                return Err(ConciliationError::UnsafePayments {
                    group_id: group_id.to_string(),
                    unsafe_payments,
                });
            }
            warn!(
                group_id = %group_id,
                unsafe_payments = unsafe_payments.len(),
                "Forcing dissolve past unsafe payments"
            );
        }

        // Past this point either nothing is unsafe or force is set, so every
        // tagged document is released.
        let mut cleared_count = 0;
        for doc in invoices.iter().chain(payments.iter()) {
            if let Err(e) = self.accessor.set_group(&doc.doctype, &doc.name, None).await {
                error!(
                    document = %doc.name,
                    group_id = %group_id,
                    cleared = cleared_count,
                    error = %e,
                    "Tag clear failed, group left partially dissolved"
                );
                record_tag_writes(self.family.as_str(), "cleared", cleared_count);
                if cleared_count > 0 {
                    self.notify_cache().await;
                }
                return Err(ConciliationError::ExternalStore(e));
            }
            cleared_count += 1;
        }

        record_tag_writes(self.family.as_str(), "cleared", cleared_count);
        if cleared_count > 0 {
            self.notify_cache().await;
        }

        info!(
            group_id = %group_id,
            cleared = cleared_count,
            forced = force,
            "Group dissolved"
        );

        Ok(DissolveOutcome {
            group_id: group_id.to_string(),
            cleared_count,
            unsafe_payments,
        })
    }

    /// Allocations of a payment that reference an invoice outside the group.
    /// Allocations are always read from a fresh fetch of the payment.
    async fn external_allocations(
        &self,
        payment: &Document,
        invoices_in_group: &HashSet<&str>,
    ) -> Result<Vec<AllocationReference>, ConciliationError> {
        let fresh = self
            .accessor
            .fetch(&payment.doctype, &payment.name)
            .await
            .map_err(ConciliationError::ExternalStore)?;

        let Some(fresh) = fresh else {
            warn!(payment = %payment.name, "Tagged payment vanished before its allocations were read");
            return Ok(Vec::new());
        };

        Ok(fresh
            .allocations
            .unwrap_or_default()
            .into_iter()
            .filter(|a| {
                is_invoice_doctype(&a.reference_kind)
                    && !invoices_in_group.contains(a.reference_name.as_str())
            })
            .collect())
    }
}
