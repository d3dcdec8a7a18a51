//! Typed access to the CRM v3 endpoints the tool uses.

use crate::error::ApiError;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

pub mod transport;

use transport::decode;

pub use transport::{RateLimitedTransport, RetryOutcome, RetryPolicy};

/// A custom object schema as returned by `/crm/v3/schemas`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub object_type_id: Option<String>,
    #[serde(default)]
    pub fully_qualified_name: Option<String>,
}

/// One property (field) of an object type
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(default)]
    pub label: String,
    /// Storage type, e.g. `string`, `enumeration`, `datetime`
    #[serde(rename = "type", default)]
    pub data_type: String,
    /// Input widget, e.g. `text`, `select`, `date`
    #[serde(default)]
    pub field_type: String,
}

/// A fetched record; property values are kept as raw JSON
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CrmRecord {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CrmRecord {
    /// Renders one property for CSV output; missing and null render empty
    #[must_use]
    pub fn property_text(&self, name: &str) -> String {
        match self.properties.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// One page of records plus the cursor for the next request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub results: Vec<CrmRecord>,
    pub next_after: Option<String>,
    /// Total matches, reported by the search endpoint only
    pub total: Option<u64>,
}

#[derive(Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    results: Vec<CrmRecord>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Deserialize)]
struct NextPage {
    after: Option<String>,
}

impl From<RawPage> for Page {
    fn from(raw: RawPage) -> Self {
        let next_after = raw
            .paging
            .and_then(|p| p.next)
            .and_then(|n| n.after)
            .filter(|a| !a.is_empty());
        Self {
            results: raw.results,
            next_after,
            total: raw.total,
        }
    }
}

/// Search filter operators used by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Eq,
    Neq,
    HasProperty,
    NotHasProperty,
}

/// A single search filter, e.g. "`associatedcompanyid` has no value"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub property_name: String,
    pub operator: FilterOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SearchFilter {
    /// Records whose `property` is empty, typically a missing parent link
    #[must_use]
    pub fn missing(property: impl Into<String>) -> Self {
        Self {
            property_name: property.into(),
            operator: FilterOperator::NotHasProperty,
            value: None,
        }
    }
}

/// Body of a search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub filters: Vec<SearchFilter>,
    pub properties: Vec<String>,
    pub limit: usize,
    pub after: Option<String>,
}

impl SearchRequest {
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "filterGroups": [{ "filters": self.filters }],
            "sorts": [{ "propertyName": "hs_object_id", "direction": "ASCENDING" }],
            "properties": self.properties,
            "limit": self.limit,
        });
        if let Some(after) = &self.after {
            body["after"] = Value::String(after.clone());
        }
        body
    }
}


/// Endpoint wrappers over [`RateLimitedTransport`]
#[derive(Debug, Clone)]
pub struct CrmClient {
    transport: RateLimitedTransport,
}

impl CrmClient {
    #[must_use]
    pub const fn new(transport: RateLimitedTransport) -> Self {
        Self { transport }
    }

    #[must_use]
    pub const fn transport(&self) -> &RateLimitedTransport {
        &self.transport
    }

    /// Custom object schemas defined in the portal
    ///
    /// # Errors
    ///
    /// Returns the transport error, or a decode error for an unexpected body.
    pub async fn list_schemas(&self) -> Result<Vec<Schema>, ApiError> {
        let value = self
            .transport
            .execute(Method::GET, "/crm/v3/schemas", None)
            .await?;
        Ok(decode::<Results<Schema>>(value)?.results)
    }

    /// Every property defined on `object`
    ///
    /// # Errors
    ///
    /// Returns the transport error, or a decode error for an unexpected body.
    pub async fn list_properties(&self, object: &str) -> Result<Vec<PropertyDefinition>, ApiError> {
        let value = self
            .transport
            .execute(Method::GET, &format!("/crm/v3/properties/{object}"), None)
            .await?;
        Ok(decode::<Results<PropertyDefinition>>(value)?.results)
    }

    fn list_path(object: &str, properties: &[String], limit: usize, after: Option<&str>) -> String {
        let mut path = format!("/crm/v3/objects/{object}?limit={limit}&archived=false");
        if !properties.is_empty() {
            let joined = properties.join(",");
            path.push_str("&properties=");
            path.push_str(&url::form_urlencoded::byte_serialize(joined.as_bytes()).collect::<String>());
        }
        if let Some(after) = after {
            path.push_str("&after=");
            path.push_str(&url::form_urlencoded::byte_serialize(after.as_bytes()).collect::<String>());
        }
        path
    }

    /// One page of the unfiltered record listing, retried on a fixed schedule
    ///
    /// # Errors
    ///
    /// Returns [`RetryOutcome`] once retries are exhausted or on cancellation.
    pub async fn list_records_retrying(
        &self,
        object: &str,
        properties: &[String],
        limit: usize,
        after: Option<&str>,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Page, RetryOutcome> {
        let path = Self::list_path(object, properties, limit, after);
        let raw: RawPage = self
            .transport
            .execute_with_retry(Method::GET, &path, None, policy, cancel)
            .await?;
        Ok(raw.into())
    }

    /// One page of a filtered search, retried on a fixed schedule
    ///
    /// # Errors
    ///
    /// Returns [`RetryOutcome`] once retries are exhausted or on cancellation.
    pub async fn search_records_retrying(
        &self,
        object: &str,
        request: &SearchRequest,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Page, RetryOutcome> {
        let body = request.to_json();
        let raw: RawPage = self
            .transport
            .execute_with_retry(
                Method::POST,
                &format!("/crm/v3/objects/{object}/search"),
                Some(&body),
                policy,
                cancel,
            )
            .await?;
        Ok(raw.into())
    }

    /// Archives up to 100 records in one call. Not retried.
    ///
    /// Any 2xx status is success whatever the body holds.
    ///
    /// # Errors
    ///
    /// Returns the transport error verbatim.
    pub async fn archive_batch(&self, object: &str, ids: &[String]) -> Result<(), ApiError> {
        let inputs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        self.transport
            .execute_status(
                Method::POST,
                &format!("/crm/v3/objects/{object}/batch/archive"),
                Some(&json!({ "inputs": inputs })),
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_page_from_raw_reads_cursor() {
        let raw: RawPage = serde_json::from_value(json!({
            "results": [{"id": "1", "properties": {"name": "Acme"}}],
            "paging": {"next": {"after": "abc", "link": "..."}}
        }))
        .unwrap();
        let page = Page::from(raw);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.next_after.as_deref(), Some("abc"));
        assert_eq!(page.total, None);
    }

    #[test]
    fn test_page_without_paging_has_no_cursor() {
        let raw: RawPage =
            serde_json::from_value(json!({"total": 0, "results": []})).unwrap();
        let page = Page::from(raw);
        assert!(page.next_after.is_none());
        assert_eq!(page.total, Some(0));
    }

    #[test]
    fn test_search_request_body() {
        let request = SearchRequest {
            filters: vec![SearchFilter::missing("associatedcompanyid")],
            properties: vec!["email".to_string()],
            limit: 100,
            after: Some("200".to_string()),
        };
        assert_eq!(
            request.to_json(),
            json!({
                "filterGroups": [{"filters": [{
                    "propertyName": "associatedcompanyid",
                    "operator": "NOT_HAS_PROPERTY"
                }]}],
                "sorts": [{"propertyName": "hs_object_id", "direction": "ASCENDING"}],
                "properties": ["email"],
                "limit": 100,
                "after": "200"
            })
        );
    }

    #[test]
    fn test_property_text() {
        let record: CrmRecord = serde_json::from_value(json!({
            "id": "7",
            "properties": {"name": "Acme", "employees": 12, "phone": null}
        }))
        .unwrap();
        assert_eq!(record.property_text("name"), "Acme");
        assert_eq!(record.property_text("employees"), "12");
        assert_eq!(record.property_text("phone"), "");
        assert_eq!(record.property_text("missing"), "");
    }

    #[test]
    fn test_list_path_encodes_properties_and_cursor() {
        let path = CrmClient::list_path(
            "contacts",
            &["email".to_string(), "firstname".to_string()],
            10,
            Some("a b"),
        );
        assert_eq!(
            path,
            "/crm/v3/objects/contacts?limit=10&archived=false&properties=email%2Cfirstname&after=a+b"
        );
    }

    #[test]
    fn test_property_definition_field_names() {
        let def: PropertyDefinition = serde_json::from_value(json!({
            "name": "email",
            "label": "Email",
            "type": "string",
            "fieldType": "text",
            "groupName": "contactinformation"
        }))
        .unwrap();
        assert_eq!(def.data_type, "string");
        assert_eq!(def.field_type, "text");
    }
}
