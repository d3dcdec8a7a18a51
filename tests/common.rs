#![allow(dead_code)]

use hubtools::config::Config;
use hubtools::{CrmClient, CrmRecord, RateLimitedTransport};
use serde_json::{json, Value};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointed at `server` with folders under `root` and no waiting
pub fn config_for(server: &MockServer, root: &Path) -> Config {
    let mut config = Config::default();
    config.api.token = Some("pat-test".to_string());
    config.api.base_url = server.uri();
    config.api.timeout_seconds = 5;
    config.batch.page_delay_ms = 0;
    config.retry.delay_seconds = 0;
    config.paths.input_dir = root.join("delete");
    config.paths.output_dir = root.join("extract");
    config
}

pub fn client_for(config: &Config) -> CrmClient {
    CrmClient::new(RateLimitedTransport::new(&config.api).unwrap())
}

pub fn record(id: &str, properties: Value) -> CrmRecord {
    CrmRecord {
        id: id.to_string(),
        properties: properties.as_object().cloned().unwrap_or_default(),
    }
}

/// Response body for one page of records `first..first + count`
pub fn page_body(first: usize, count: usize, after: Option<&str>) -> Value {
    let results: Vec<Value> = (first..first + count)
        .map(|id| json!({"id": id.to_string(), "properties": {"name": format!("record {id}")}}))
        .collect();
    let mut body = json!({ "results": results });
    if let Some(after) = after {
        body["paging"] = json!({"next": {"after": after}});
    }
    body
}

/// Serves an empty custom schema list
pub async fn mount_schemas(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/crm/v3/schemas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(server)
        .await;
}
