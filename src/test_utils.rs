// This module is only compiled when running tests
#![cfg(any(test, feature = "testing"))]

use crate::api::CrmRecord;
use crate::config::Config;
use serde_json::Value;
use std::env;
use std::path::Path;

/// Restores the listed environment variables when dropped
pub struct EnvGuard {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvGuard {
    #[must_use]
    pub fn new(vars: Vec<&'static str>) -> Self {
        let vars = vars
            .into_iter()
            .map(|var| (var, env::var(var).ok()))
            .collect();
        Self { vars }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (var, original_value) in &self.vars {
            match original_value {
                Some(value) => env::set_var(var, value),
                None => env::remove_var(var),
            }
        }
    }
}

/// Record with the given properties; non-object JSON gives no properties
#[must_use]
pub fn record(id: &str, properties: Value) -> CrmRecord {
    CrmRecord {
        id: id.to_string(),
        properties: properties.as_object().cloned().unwrap_or_default(),
    }
}

/// Configuration pointed at a mock server, with folders under `root` and
/// no waiting between pages or retries
#[must_use]
pub fn test_config(base_url: &str, root: &Path) -> Config {
    let mut config = Config::default();
    config.api.token = Some("pat-test".to_string());
    config.api.base_url = base_url.to_string();
    config.api.timeout_seconds = 5;
    config.batch.page_delay_ms = 0;
    config.retry.delay_seconds = 0;
    config.paths.input_dir = root.join("delete");
    config.paths.output_dir = root.join("extract");
    config
}
