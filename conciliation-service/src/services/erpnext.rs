//! ERPNext (Frappe) REST client.
//!
//! Implements [`DocumentAccessor`] over `/api/resource` and
//! `frappe.client.set_value`. The group tag is a custom field whose name is
//! configurable per site.

use crate::config::ErpNextConfig;
use crate::models::{
    AllocationReference, Document, DocumentKind, DocumentQuery, GroupFilter, PAYMENT_ENTRY,
    PURCHASE_INVOICE, SALES_INVOICE,
};
use crate::services::accessor::DocumentAccessor;
use crate::services::metrics::STORE_CALL_DURATION;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::instrument;

/// Longest slice of an error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct SetValueRequest<'a> {
    doctype: &'a str,
    name: &'a str,
    fieldname: &'a str,
    value: &'a str,
}

/// Invoice or Payment Entry as returned by the resource API.
#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    supplier: Option<String>,
    #[serde(default)]
    party: Option<String>,
    #[serde(default)]
    party_type: Option<String>,
    posting_date: NaiveDate,
    #[serde(default)]
    docstatus: Option<i32>,
    #[serde(default)]
    outstanding_amount: Option<Decimal>,
    #[serde(default)]
    unallocated_amount: Option<Decimal>,
    #[serde(default)]
    is_return: Option<i32>,
    #[serde(default)]
    is_debit_note: Option<i32>,
    #[serde(default)]
    references: Option<Vec<RawReference>>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    reference_doctype: String,
    reference_name: String,
    #[serde(default)]
    allocated_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawCompany {
    #[serde(default)]
    abbr: Option<String>,
}

/// Field holding the party on documents of the given doctype.
pub fn party_field(doctype: &str) -> &'static str {
    match doctype {
        SALES_INVOICE => "customer",
        PURCHASE_INVOICE => "supplier",
        _ => "party",
    }
}

/// Translate a typed query into Frappe's `filters` list.
pub fn build_filters(doctype: &str, query: &DocumentQuery, group_field: &str) -> Value {
    let mut filters = Vec::new();

    if let Some(company) = &query.company {
        filters.push(json!([doctype, "company", "=", company]));
    }
    if let Some(party) = &query.party {
        filters.push(json!([doctype, party_field(doctype), "=", party]));
    }
    if let Some(party_type) = &query.party_type {
        filters.push(json!([doctype, "party_type", "=", party_type]));
    }
    if query.submitted_only {
        filters.push(json!([doctype, "docstatus", "=", 1]));
    }
    match &query.group {
        GroupFilter::Any => {}
        GroupFilter::Tagged => filters.push(json!([doctype, group_field, "is", "set"])),
        GroupFilter::Equals(id) => filters.push(json!([doctype, group_field, "=", id])),
    }

    Value::Array(filters)
}

/// Columns requested when listing documents of the given doctype.
pub fn list_fields(doctype: &str, group_field: &str) -> Vec<String> {
    let mut fields = vec![
        "name".to_string(),
        "company".to_string(),
        "posting_date".to_string(),
        "docstatus".to_string(),
        group_field.to_string(),
    ];
    match doctype {
        PAYMENT_ENTRY => {
            fields.push("party_type".to_string());
            fields.push("party".to_string());
            fields.push("unallocated_amount".to_string());
        }
        _ => {
            fields.push(party_field(doctype).to_string());
            fields.push("outstanding_amount".to_string());
            fields.push("is_return".to_string());
            // Purchase Invoice has no such column; a purchase return is the debit note.
            if doctype == SALES_INVOICE {
                fields.push("is_debit_note".to_string());
            }
        }
    }
    fields
}

/// Map a resource-API object onto the store projection.
pub fn document_from_value(doctype: &str, value: Value, group_field: &str) -> Result<Document> {
    let kind = DocumentKind::from_doctype(doctype)
        .ok_or_else(|| anyhow!("Unsupported doctype: {}", doctype))?;
    let raw: RawDocument = serde_json::from_value(value)
        .map_err(|e| anyhow!("Malformed {} payload: {}", doctype, e))?;

    let party = match doctype {
        SALES_INVOICE => raw.customer,
        PURCHASE_INVOICE => raw.supplier,
        _ => raw.party,
    }
    .unwrap_or_default();

    let group_id = raw
        .extra
        .get(group_field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let allocations = raw.references.map(|refs| {
        refs.into_iter()
            .map(|r| AllocationReference {
                reference_name: r.reference_name,
                reference_kind: r.reference_doctype,
                allocated_amount: r.allocated_amount.unwrap_or_default(),
            })
            .collect()
    });

    Ok(Document {
        name: raw.name,
        doctype: doctype.to_string(),
        kind,
        company: raw.company.unwrap_or_default(),
        party,
        party_type: raw.party_type,
        posting_date: raw.posting_date,
        submitted: raw.docstatus == Some(1),
        outstanding_amount: raw.outstanding_amount.unwrap_or_default(),
        unallocated_amount: raw.unallocated_amount.unwrap_or_default(),
        is_return: raw.is_return.unwrap_or(0) != 0,
        is_debit_note: raw.is_debit_note.unwrap_or(0) != 0,
        group_id,
        allocations,
    })
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// ERPNext client for document reads and group-tag writes.
#[derive(Clone)]
pub struct ErpNextClient {
    client: Client,
    config: ErpNextConfig,
}

impl ErpNextClient {
    pub fn new(config: ErpNextConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Url::parse(&config.url).map_err(|e| anyhow!("Invalid ERPNext URL: {}", e))?;

        Ok(Self { client, config })
    }

    /// Name of the custom field carrying the group tag.
    pub fn group_field(&self) -> &str {
        &self.config.conciliation_field
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(&self.config.url).map_err(|e| anyhow!("Invalid ERPNext URL: {}", e))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("ERPNext URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            return request;
        }
        request.header(
            reqwest::header::AUTHORIZATION,
            format!(
                "token {}:{}",
                self.config.api_key,
                self.config.api_secret.expose_secret()
            ),
        )
    }

    async fn error_from(response: reqwest::Response, action: &str) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, action = %action, "ERPNext request failed");
        anyhow!(
            "ERPNext {} failed with {}: {}",
            action,
            status,
            truncate_body(&body)
        )
    }

    /// Fetch a raw document; `None` on 404.
    #[instrument(skip(self))]
    pub async fn get_doc(&self, doctype: &str, name: &str) -> Result<Option<Value>> {
        let url = self.url(&["api", "resource", doctype, name])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response, "get_doc").await);
        }

        let envelope: DataEnvelope<Value> = response.json().await?;
        Ok(Some(envelope.data))
    }

    #[instrument(skip(self, filters))]
    async fn get_list(&self, doctype: &str, filters: Value, fields: &[String]) -> Result<Vec<Value>> {
        let url = self.url(&["api", "resource", doctype])?;
        let filters = serde_json::to_string(&filters)?;
        let fields = serde_json::to_string(fields)?;

        let response = self
            .authorize(self.client.get(url))
            .query(&[
                ("filters", filters.as_str()),
                ("fields", fields.as_str()),
                ("limit_page_length", "0"),
                ("order_by", "posting_date asc, name asc"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "get_list").await);
        }

        let envelope: DataEnvelope<Vec<Value>> = response.json().await?;
        Ok(envelope.data)
    }

    /// Abbreviation of a company, used to build party name variants.
    /// `None` when the company does not exist; empty when it has no abbreviation.
    #[instrument(skip(self))]
    pub async fn company_abbr(&self, company: &str) -> Result<Option<String>> {
        let timer = STORE_CALL_DURATION
            .with_label_values(&["company_abbr"])
            .start_timer();

        let Some(company_doc) = self.get_doc("Company", company).await? else {
            timer.observe_duration();
            return Ok(None);
        };
        let raw: RawCompany = serde_json::from_value(company_doc)?;

        timer.observe_duration();
        Ok(Some(raw.abbr.unwrap_or_default()))
    }
}

#[async_trait]
impl DocumentAccessor for ErpNextClient {
    #[instrument(skip(self), fields(store = "erpnext"))]
    async fn fetch(&self, doctype: &str, name: &str) -> Result<Option<Document>> {
        let timer = STORE_CALL_DURATION
            .with_label_values(&["fetch"])
            .start_timer();

        let doc = match self.get_doc(doctype, name).await? {
            Some(value) => Some(document_from_value(doctype, value, self.group_field())?),
            None => None,
        };

        timer.observe_duration();
        Ok(doc)
    }

    #[instrument(skip(self), fields(store = "erpnext"))]
    async fn set_group(&self, doctype: &str, name: &str, group_id: Option<&str>) -> Result<()> {
        let timer = STORE_CALL_DURATION
            .with_label_values(&["set_group"])
            .start_timer();

        let url = self.url(&["api", "method", "frappe.client.set_value"])?;
        let request = SetValueRequest {
            doctype,
            name,
            fieldname: self.group_field(),
            value: group_id.unwrap_or(""),
        };

        let response = self
            .authorize(self.client.post(url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "set_value").await);
        }

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, query), fields(store = "erpnext"))]
    async fn query(&self, doctype: &str, query: &DocumentQuery) -> Result<Vec<Document>> {
        let timer = STORE_CALL_DURATION
            .with_label_values(&["query"])
            .start_timer();

        let filters = build_filters(doctype, query, self.group_field());
        let fields = list_fields(doctype, self.group_field());
        let rows = self.get_list(doctype, filters, &fields).await?;

        let docs = rows
            .into_iter()
            .map(|row| document_from_value(doctype, row, self.group_field()))
            .collect::<Result<Vec<_>>>()?;

        timer.observe_duration();
        tracing::debug!(doctype = %doctype, count = docs.len(), "Documents listed");
        Ok(docs)
    }

    async fn health_check(&self) -> Result<()> {
        let url = self.url(&["api", "method", "ping"])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "ping").await);
        }
        Ok(())
    }
}
