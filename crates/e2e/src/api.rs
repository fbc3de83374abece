//! Client for the live CTAN API
//!
//! Pure oracle checks: no retries, no caching. A network failure fails the
//! calling test immediately, and is indistinguishable here from a genuine
//! regression upstream.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::API;

pub struct ApiClient {
    client: reqwest::Client,
    base: String,
}

impl ApiClient {
    pub fn new() -> HarnessResult<Self> {
        Self::with_base(API)
    }

    pub fn with_base(base: &str) -> HarnessResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// GET a path under the API root. Requires HTTP 200 and a JSON body.
    pub async fn get_json(&self, path: &str) -> HarnessResult<Value> {
        let url = format!("{}{}", self.base, path);
        debug!("GET {}", url);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(HarnessError::Assertion(format!(
                "GET {url} returned {status}"
            )));
        }
        Ok(resp.json().await?)
    }
}

/// A list-valued key such as `consorcios`, `paradas`, `horario`.
pub fn list<'a>(data: &'a Value, key: &str) -> HarnessResult<&'a Vec<Value>> {
    data.get(key).and_then(Value::as_array).ok_or_else(|| {
        HarnessError::Assertion(format!("response is missing list key {key:?}"))
    })
}

/// Scalar field as a string. The upstream API is inconsistent about whether
/// IDs arrive as strings or numbers, so numbers are stringified.
pub fn field(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}

/// Scalar field as an integer, accepting both numeric and string encodings.
pub fn int_field(item: &Value, key: &str) -> Option<i64> {
    match item.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
