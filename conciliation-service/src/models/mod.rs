//! Domain models for conciliation-service.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Document Families and Kinds
// ============================================================================

/// Accounts receivable (customer) or accounts payable (supplier) documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFamily {
    Customer,
    Supplier,
}

impl DocumentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Supplier => "supplier",
        }
    }

    /// Parse the plural form used in HTTP paths (`customers`, `suppliers`).
    pub fn from_path_segment(s: &str) -> Option<Self> {
        match s {
            "customers" => Some(Self::Customer),
            "suppliers" => Some(Self::Supplier),
            _ => None,
        }
    }

    /// Party type declared on payments belonging to this family.
    pub fn party_type(&self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Supplier => "Supplier",
        }
    }

    /// Prefix of group identifiers minted for this family.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Customer => "CONC-CUS",
            Self::Supplier => "CONC-SUP",
        }
    }

    pub fn invoice_doctype(&self) -> &'static str {
        match self {
            Self::Customer => SALES_INVOICE,
            Self::Supplier => PURCHASE_INVOICE,
        }
    }

    pub fn payment_doctype(&self) -> &'static str {
        PAYMENT_ENTRY
    }

    pub fn doctype(&self, kind: DocumentKind) -> &'static str {
        match kind {
            DocumentKind::Invoice => self.invoice_doctype(),
            DocumentKind::Payment => self.payment_doctype(),
        }
    }

    /// Kinds probed, in order, when a reference carries no usable hint.
    pub fn candidate_kinds(&self) -> [DocumentKind; 2] {
        [DocumentKind::Invoice, DocumentKind::Payment]
    }
}

pub const SALES_INVOICE: &str = "Sales Invoice";
pub const PURCHASE_INVOICE: &str = "Purchase Invoice";
pub const PAYMENT_ENTRY: &str = "Payment Entry";

/// Whether an allocation's reference doctype points at an invoice of either family.
pub fn is_invoice_doctype(doctype: &str) -> bool {
    doctype == SALES_INVOICE || doctype == PURCHASE_INVOICE
}

/// Stored kind of a document. Credit and debit notes are Invoice-kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Invoice,
    Payment,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payment => "payment",
        }
    }

    pub fn from_doctype(doctype: &str) -> Option<Self> {
        match doctype {
            SALES_INVOICE | PURCHASE_INVOICE => Some(Self::Invoice),
            PAYMENT_ENTRY => Some(Self::Payment),
            _ => None,
        }
    }
}

/// Display label. Never used for balance arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLabel {
    Invoice,
    CreditNote,
    DebitNote,
    Payment,
}

impl DocumentLabel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Invoice => "Factura",
            Self::CreditNote => "Nota de Crédito",
            Self::DebitNote => "Nota de Débito",
            Self::Payment => "Pago",
        }
    }
}

// ============================================================================
// Store Projections
// ============================================================================

/// A payment's record of an invoice it has been applied against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReference {
    pub reference_name: String,
    pub reference_kind: String,
    pub allocated_amount: Decimal,
}

/// Projection of an invoice or payment held by the external document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: String,
    pub doctype: String,
    pub kind: DocumentKind,
    pub company: String,
    /// Customer/supplier on invoices, counterparty on payments.
    pub party: String,
    /// Declared party type; payments only.
    pub party_type: Option<String>,
    pub posting_date: NaiveDate,
    pub submitted: bool,
    pub outstanding_amount: Decimal,
    pub unallocated_amount: Decimal,
    pub is_return: bool,
    pub is_debit_note: bool,
    pub group_id: Option<String>,
    /// `None` when the projection was listed without its allocation table.
    pub allocations: Option<Vec<AllocationReference>>,
}

impl Document {
    pub fn label(&self) -> DocumentLabel {
        match self.kind {
            DocumentKind::Payment => DocumentLabel::Payment,
            // A purchase return is the supplier's debit note.
            DocumentKind::Invoice if self.is_return && self.doctype == PURCHASE_INVOICE => {
                DocumentLabel::DebitNote
            }
            DocumentKind::Invoice if self.is_return => DocumentLabel::CreditNote,
            DocumentKind::Invoice if self.is_debit_note => DocumentLabel::DebitNote,
            DocumentKind::Invoice => DocumentLabel::Invoice,
        }
    }

    /// Outstanding amount for invoices, unallocated amount for payments.
    pub fn open_amount(&self) -> Decimal {
        match self.kind {
            DocumentKind::Invoice => self.outstanding_amount,
            DocumentKind::Payment => self.unallocated_amount,
        }
    }

    pub fn is_tagged_with(&self, group_id: &str) -> bool {
        self.group_id.as_deref() == Some(group_id)
    }
}

/// Group-tag predicate for store queries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupFilter {
    #[default]
    Any,
    Tagged,
    Equals(String),
}

/// Typed filter set understood by every [`DocumentAccessor`](crate::services::DocumentAccessor).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub company: Option<String>,
    pub party: Option<String>,
    pub party_type: Option<String>,
    pub group: GroupFilter,
    pub submitted_only: bool,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn company(mut self, company: &str) -> Self {
        self.company = Some(company.to_string());
        self
    }

    pub fn party(mut self, party: &str) -> Self {
        self.party = Some(party.to_string());
        self
    }

    pub fn party_type(mut self, party_type: &str) -> Self {
        self.party_type = Some(party_type.to_string());
        self
    }

    pub fn group(mut self, group: GroupFilter) -> Self {
        self.group = group;
        self
    }

    pub fn submitted(mut self) -> Self {
        self.submitted_only = true;
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if self.submitted_only && !doc.submitted {
            return false;
        }
        if let Some(company) = &self.company {
            if &doc.company != company {
                return false;
            }
        }
        if let Some(party) = &self.party {
            if &doc.party != party {
                return false;
            }
        }
        if let Some(party_type) = &self.party_type {
            if doc.party_type.as_ref() != Some(party_type) {
                return false;
            }
        }
        match &self.group {
            GroupFilter::Any => true,
            GroupFilter::Tagged => doc.group_id.is_some(),
            GroupFilter::Equals(id) => doc.is_tagged_with(id),
        }
    }
}

// ============================================================================
// Operation Inputs and Outputs
// ============================================================================

/// Caller-supplied pointer to a document, with an optional kind hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub voucher_no: String,
    #[serde(default)]
    pub voucher_type: Option<String>,
}

impl DocumentRef {
    pub fn new(voucher_no: &str) -> Self {
        Self {
            voucher_no: voucher_no.to_string(),
            voucher_type: None,
        }
    }

    pub fn with_hint(voucher_no: &str, hint: &str) -> Self {
        Self {
            voucher_no: voucher_no.to_string(),
            voucher_type: Some(hint.to_string()),
        }
    }
}

/// Summary of a document tagged by an assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub label: DocumentLabel,
    pub display_label: &'static str,
    pub posting_date: NaiveDate,
    /// Outstanding (invoice) or unallocated (payment) amount, unsigned.
    pub amount: Decimal,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentOutcome {
    pub group_id: String,
    /// True when the call minted a new group id.
    pub created: bool,
    pub documents: Vec<AssignedDocument>,
}

/// A document as shown inside a reconstructed group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub name: String,
    pub kind: DocumentKind,
    pub label: DocumentLabel,
    pub display_label: &'static str,
    pub posting_date: NaiveDate,
    /// Signed contribution: outstanding for invoices, minus unallocated for payments.
    pub amount: Decimal,
    /// `None` for payments shown only because they are allocated to a member invoice.
    pub group_id: Option<String>,
}

/// Group derived from the documents currently carrying `group_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationGroup {
    pub group_id: String,
    pub documents: Vec<GroupMember>,
    pub total_amount: Decimal,
    pub posting_date: NaiveDate,
}

/// A grouped payment with allocations reaching outside its group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnsafePayment {
    pub payment: String,
    pub external_allocations: Vec<AllocationReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DissolveOutcome {
    pub group_id: String,
    pub cleared_count: usize,
    pub unsafe_payments: Vec<UnsafePayment>,
}
