//! Common test utilities for conciliation-service integration tests.
#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::NaiveDate;
use conciliation_service::models::{
    AllocationReference, Document, DocumentKind, DocumentQuery, PAYMENT_ENTRY, PURCHASE_INVOICE,
    SALES_INVOICE,
};
use conciliation_service::services::{
    CacheInvalidationSink, ConciliationService, ConciliationServices, DocumentAccessor,
    PartyError, PartyResolver,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Once};

pub const COMPANY: &str = "Acme SA";
pub const OTHER_COMPANY: &str = "Otra Empresa SRL";
pub const CUSTOMER: &str = "Cliente Uno";
pub const OTHER_CUSTOMER: &str = "Cliente Dos";
pub const SUPPLIER: &str = "Proveedor Uno";
pub const CACHE_PREFIX: &str = "conciliation";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,conciliation_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn base(name: &str, doctype: &str, party: &str, posting_date: NaiveDate) -> Document {
    Document {
        name: name.to_string(),
        doctype: doctype.to_string(),
        kind: DocumentKind::from_doctype(doctype).unwrap(),
        company: COMPANY.to_string(),
        party: party.to_string(),
        party_type: None,
        posting_date,
        submitted: true,
        outstanding_amount: Decimal::ZERO,
        unallocated_amount: Decimal::ZERO,
        is_return: false,
        is_debit_note: false,
        group_id: None,
        allocations: None,
    }
}

/// Submitted customer invoice of [`COMPANY`].
pub fn sales_invoice(name: &str, party: &str, outstanding: &str, posting_date: NaiveDate) -> Document {
    let mut doc = base(name, SALES_INVOICE, party, posting_date);
    doc.outstanding_amount = dec(outstanding);
    doc
}

/// Submitted supplier invoice of [`COMPANY`].
pub fn purchase_invoice(
    name: &str,
    party: &str,
    outstanding: &str,
    posting_date: NaiveDate,
) -> Document {
    let mut doc = base(name, PURCHASE_INVOICE, party, posting_date);
    doc.outstanding_amount = dec(outstanding);
    doc
}

/// Submitted payment of [`COMPANY`] with an empty allocation table.
pub fn payment(
    name: &str,
    party_type: &str,
    party: &str,
    unallocated: &str,
    posting_date: NaiveDate,
) -> Document {
    let mut doc = base(name, PAYMENT_ENTRY, party, posting_date);
    doc.party_type = Some(party_type.to_string());
    doc.unallocated_amount = dec(unallocated);
    doc.allocations = Some(Vec::new());
    doc
}

pub fn allocation(reference_kind: &str, reference_name: &str, amount: &str) -> AllocationReference {
    AllocationReference {
        reference_name: reference_name.to_string(),
        reference_kind: reference_kind.to_string(),
        allocated_amount: dec(amount),
    }
}

pub fn tagged(mut doc: Document, group_id: &str) -> Document {
    doc.group_id = Some(group_id.to_string());
    doc
}

pub fn allocated(mut doc: Document, allocations: Vec<AllocationReference>) -> Document {
    doc.allocations = Some(allocations);
    doc
}

type QueryFailure = Box<dyn Fn(&str, &DocumentQuery) -> bool + Send + Sync>;

/// In-memory document store with failure injection.
///
/// Documents keep insertion order. `query` returns list projections without
/// allocation tables, `fetch` returns the full document.
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<Vec<Document>>,
    writes: Mutex<Vec<(String, Option<String>)>>,
    fetches: Mutex<Vec<String>>,
    failing_fetches: Mutex<HashSet<String>>,
    failing_queries: Mutex<Vec<QueryFailure>>,
    writes_before_failure: Mutex<Option<usize>>,
    unavailable: Mutex<bool>,
}

impl InMemoryStore {
    pub fn with_documents(docs: Vec<Document>) -> Self {
        let store = Self::default();
        *store.docs.lock().unwrap() = docs;
        store
    }

    pub fn insert(&self, doc: Document) {
        self.docs.lock().unwrap().push(doc);
    }

    pub fn document(&self, name: &str) -> Document {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no document {}", name))
    }

    pub fn group_of(&self, name: &str) -> Option<String> {
        self.document(name).group_id
    }

    /// Every tag write so far, as `(document, new group)`.
    pub fn writes(&self) -> Vec<(String, Option<String>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fail_fetch(&self, name: &str) {
        self.failing_fetches.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_queries_when<F>(&self, predicate: F)
    where
        F: Fn(&str, &DocumentQuery) -> bool + Send + Sync + 'static,
    {
        self.failing_queries.lock().unwrap().push(Box::new(predicate));
    }

    /// Let `n` tag writes succeed, then fail every following one.
    pub fn fail_writes_after(&self, n: usize) {
        *self.writes_before_failure.lock().unwrap() = Some(n);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl DocumentAccessor for InMemoryStore {
    async fn fetch(&self, doctype: &str, name: &str) -> Result<Option<Document>, anyhow::Error> {
        self.fetches.lock().unwrap().push(name.to_string());
        if self.failing_fetches.lock().unwrap().contains(name) {
            return Err(anyhow!("connection reset fetching {}", name));
        }
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.doctype == doctype && d.name == name)
            .cloned())
    }

    async fn set_group(
        &self,
        doctype: &str,
        name: &str,
        group_id: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        {
            let mut remaining = self.writes_before_failure.lock().unwrap();
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    return Err(anyhow!("store rejected write to {}", name));
                }
                *n -= 1;
            }
        }

        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .iter_mut()
            .find(|d| d.doctype == doctype && d.name == name)
            .ok_or_else(|| anyhow!("{} {} not found", doctype, name))?;
        doc.group_id = group_id.map(String::from);

        self.writes
            .lock()
            .unwrap()
            .push((name.to_string(), group_id.map(String::from)));
        Ok(())
    }

    async fn query(
        &self,
        doctype: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>, anyhow::Error> {
        if self
            .failing_queries
            .lock()
            .unwrap()
            .iter()
            .any(|fails| fails(doctype, query))
        {
            return Err(anyhow!("timeout listing {}", doctype));
        }
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.doctype == doctype && query.matches(d))
            .cloned()
            .map(|mut d| {
                d.allocations = None;
                d
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        if *self.unavailable.lock().unwrap() {
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }
}

/// Party resolver backed by a fixed alias table.
#[derive(Default)]
pub struct FixedPartyResolver {
    aliases: Mutex<HashMap<String, HashSet<String>>>,
    unknown_companies: Mutex<HashSet<String>>,
}

impl FixedPartyResolver {
    pub fn alias(&self, party: &str, alias: &str) {
        self.aliases
            .lock()
            .unwrap()
            .entry(party.to_string())
            .or_default()
            .insert(alias.to_string());
    }

    /// Report `company` as missing from the store.
    pub fn forget_company(&self, company: &str) {
        self.unknown_companies
            .lock()
            .unwrap()
            .insert(company.to_string());
    }
}

#[async_trait]
impl PartyResolver for FixedPartyResolver {
    async fn equivalent_names(
        &self,
        party: &str,
        company: &str,
    ) -> Result<HashSet<String>, PartyError> {
        if self.unknown_companies.lock().unwrap().contains(company) {
            return Err(PartyError::UnknownCompany(company.to_string()));
        }
        let mut names = self
            .aliases
            .lock()
            .unwrap()
            .get(party)
            .cloned()
            .unwrap_or_default();
        names.insert(party.to_string());
        Ok(names)
    }
}

/// Cache sink that records every invalidated prefix.
#[derive(Default)]
pub struct RecordingCacheSink {
    invalidated: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl RecordingCacheSink {
    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl CacheInvalidationSink for RecordingCacheSink {
    async fn invalidate(&self, prefix: &str) -> Result<(), anyhow::Error> {
        self.invalidated.lock().unwrap().push(prefix.to_string());
        if *self.failing.lock().unwrap() {
            return Err(anyhow!("cache unreachable"));
        }
        Ok(())
    }
}

/// Engines for both families wired to in-memory collaborators.
pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub parties: Arc<FixedPartyResolver>,
    pub cache: Arc<RecordingCacheSink>,
    pub services: ConciliationServices,
}

impl TestEngine {
    pub fn customers(&self) -> &ConciliationService {
        &self.services.customer
    }

    pub fn suppliers(&self) -> &ConciliationService {
        &self.services.supplier
    }
}

pub fn spawn_engine(docs: Vec<Document>) -> TestEngine {
    init_tracing();

    let store = Arc::new(InMemoryStore::with_documents(docs));
    let parties = Arc::new(FixedPartyResolver::default());
    let cache = Arc::new(RecordingCacheSink::default());
    let services = ConciliationServices::new(
        store.clone(),
        parties.clone(),
        cache.clone(),
        CACHE_PREFIX,
    );

    TestEngine {
        store,
        parties,
        cache,
        services,
    }
}
