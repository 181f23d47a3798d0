use crate::models::{Document, DocumentKind, GroupMember};
use rust_decimal::Decimal;

/// Contribution of a document to its group's balance: outstanding amount for
/// invoices (credit notes included, as stored), minus the unallocated amount
/// for payments.
pub fn signed_amount(doc: &Document) -> Decimal {
    match doc.kind {
        DocumentKind::Invoice => doc.outstanding_amount,
        DocumentKind::Payment => -doc.unallocated_amount,
    }
}

/// Round a group total to cents.
pub fn round_total(total: Decimal) -> Decimal {
    total.round_dp(2)
}

/// Build the group-view entry for a document.
pub fn member_of(doc: &Document, group_id: Option<&str>) -> GroupMember {
    let label = doc.label();
    GroupMember {
        name: doc.name.clone(),
        kind: doc.kind,
        label,
        display_label: label.display_name(),
        posting_date: doc.posting_date,
        amount: signed_amount(doc),
        group_id: group_id.map(String::from),
    }
}
