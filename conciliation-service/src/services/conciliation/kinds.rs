//! Resolution of caller references to stored documents.
//!
//! A reference names a voucher and optionally hints at its kind using
//! whatever vocabulary the caller has ("Factura", "NC", "Payment Entry").
//! Resolution tries the hinted kind first and then the family's remaining
//! candidate kinds in fixed order, stopping at the first hit.

use crate::models::{Document, DocumentFamily, DocumentKind, DocumentRef};
use crate::services::accessor::DocumentAccessor;
use crate::services::error::ConciliationError;

const KIND_SYNONYMS: &[(&str, DocumentKind)] = &[
    ("invoice", DocumentKind::Invoice),
    ("factura", DocumentKind::Invoice),
    ("sales invoice", DocumentKind::Invoice),
    ("purchase invoice", DocumentKind::Invoice),
    ("credit note", DocumentKind::Invoice),
    ("nota de credito", DocumentKind::Invoice),
    ("debit note", DocumentKind::Invoice),
    ("nota de debito", DocumentKind::Invoice),
    ("fc", DocumentKind::Invoice),
    ("nc", DocumentKind::Invoice),
    ("nd", DocumentKind::Invoice),
    ("payment", DocumentKind::Payment),
    ("pago", DocumentKind::Payment),
    ("payment entry", DocumentKind::Payment),
    ("recibo", DocumentKind::Payment),
    ("orden de pago", DocumentKind::Payment),
    ("op", DocumentKind::Payment),
    ("rc", DocumentKind::Payment),
];

fn normalize(hint: &str) -> String {
    hint.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            '_' | '-' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a caller-supplied kind hint onto a stored kind.
pub fn kind_from_hint(hint: &str) -> Option<DocumentKind> {
    let normalized = normalize(hint);
    KIND_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == normalized)
        .map(|(_, kind)| *kind)
}

/// Kinds to probe for a reference, hinted kind first, without repeats.
pub fn probe_order(family: DocumentFamily, hint: Option<&str>) -> Vec<DocumentKind> {
    let mut order = Vec::with_capacity(2);
    if let Some(kind) = hint.and_then(kind_from_hint) {
        order.push(kind);
    }
    for kind in family.candidate_kinds() {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}

/// Outcome of probing the store for a reference.
#[derive(Debug)]
pub enum Resolution {
    Resolved(Document),
    Unresolved { tried: Vec<DocumentKind> },
}

/// Probe the store for a reference in [`probe_order`].
pub async fn resolve_reference(
    accessor: &dyn DocumentAccessor,
    family: DocumentFamily,
    reference: &DocumentRef,
) -> Result<Resolution, ConciliationError> {
    let order = probe_order(family, reference.voucher_type.as_deref());

    for kind in &order {
        let doctype = family.doctype(*kind);
        let found = accessor
            .fetch(doctype, &reference.voucher_no)
            .await
            .map_err(ConciliationError::ExternalStore)?;

        if let Some(doc) = found {
            tracing::debug!(
                voucher_no = %reference.voucher_no,
                doctype = %doctype,
                "Reference resolved"
            );
            return Ok(Resolution::Resolved(doc));
        }
    }

    Ok(Resolution::Unresolved { tried: order })
}
