//! HTTP resolver (§4.4 reference implementation): GET query-merge,
//! POST/PUT body-or-template, status-code mapping, and fan-out
//! aggregation across a primary source plus its configured alternates.

use std::cmp::Ordering;
use std::time::Duration;

use engine_stores::model::{AggregationKind, DataSource};
use engine_stores::traits::DataSourceStore;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;

use crate::resolver::{ResolveOutcome, Resolver};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETRY: Duration = Duration::from_secs(5);

pub struct HttpResolver {
    client: reqwest::Client,
    sources: Arc<dyn DataSourceStore>,
    call_timeout: Duration,
    default_retry: Duration,
}

impl HttpResolver {
    #[must_use]
    pub fn new(sources: Arc<dyn DataSourceStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            sources,
            call_timeout: DEFAULT_TIMEOUT,
            default_retry: DEFAULT_RETRY,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    async fn fetch_one(&self, source: &DataSource, payload: &Value) -> ResolveOutcome {
        let request = match self.build_request(source, payload) {
            Ok(req) => req,
            Err(error) => return ResolveOutcome::Failure { error },
        };

        match request.timeout(self.call_timeout).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if status.is_success() {
                    ResolveOutcome::Success { result: body }
                } else if status.is_client_error() {
                    ResolveOutcome::Failure { error: body }
                } else {
                    ResolveOutcome::Retry {
                        after: self.default_retry,
                    }
                }
            }
            Err(err) => ResolveOutcome::Error(anyhow::Error::new(err)),
        }
    }

    fn build_request(&self, source: &DataSource, payload: &Value) -> Result<reqwest::RequestBuilder, String> {
        let method = source
            .method
            .parse::<Method>()
            .map_err(|_| format!("unsupported method '{}'", source.method))?;

        let mut builder = if method == Method::GET {
            let mut builder = self.client.request(method, &source.url);
            if let Some(obj) = payload.as_object() {
                let query: Vec<(&String, &str)> = obj
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k, s)))
                    .collect();
                builder = builder.query(&query);
            }
            builder
        } else {
            let body = if payload.as_object().is_some_and(|o| !o.is_empty()) {
                payload.clone()
            } else {
                source.body_template.clone().unwrap_or(Value::Null)
            };
            self.client
                .request(method, &source.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(&body)
        };

        for (key, value) in &source.headers {
            builder = builder.header(key, value);
        }
        Ok(builder)
    }

    async fn fetch_aggregated(&self, account_id: &str, source: &DataSource, alternate_ids: &[String], payload: &Value) -> ResolveOutcome {
        let mut fan_out = vec![source.clone()];
        for id in alternate_ids {
            if let Ok(alt) = self.sources.get(account_id, id).await {
                fan_out.push(alt);
            }
        }
        let total = fan_out.len();

        let outcomes = futures::future::join_all(fan_out.iter().map(|s| self.fetch_one(s, payload))).await;
        let values: Vec<f64> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ResolveOutcome::Success { result } => parse_numeric(result),
                _ => None,
            })
            .collect();

        if values.len() * 2 < total {
            return ResolveOutcome::Retry {
                after: self.default_retry,
            };
        }

        let aggregate = aggregate(&values, source.aggregation.unwrap_or(AggregationKind::Median));
        ResolveOutcome::Success {
            result: aggregate.to_string(),
        }
    }
}

fn parse_numeric(body: &str) -> Option<f64> {
    body.trim()
        .parse::<f64>()
        .ok()
        .or_else(|| serde_json::from_str::<Value>(body).ok().and_then(|v| v.as_f64()))
}

fn aggregate(values: &[f64], kind: AggregationKind) -> f64 {
    match kind {
        AggregationKind::Mean => {
            #[allow(clippy::cast_precision_loss)]
            let count = values.len() as f64;
            values.iter().sum::<f64>() / count
        }
        AggregationKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationKind::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
    }
}

#[async_trait::async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, account_id: &str, source: &DataSource, payload: &Value) -> ResolveOutcome {
        let alternate_ids: Vec<String> = payload
            .get("alternate_source_ids")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_else(|| source.alternate_source_ids.clone());

        if alternate_ids.is_empty() {
            self.fetch_one(source, payload).await
        } else {
            self.fetch_aggregated(account_id, source, &alternate_ids, payload).await
        }
    }
}
