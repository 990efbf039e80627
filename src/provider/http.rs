//! Provider backed by a provisioning HTTP API.
//!
//! - `POST /resources` with a resolved resource, returns the created resource
//! - `GET /resources?kind=..&tag=Key=Value` lists matching resources
//! - `DELETE /resources/{id}` removes one (404 counts as already gone)
//!
//! Server errors, throttling and transport failures are transient and are
//! retried here; any other status aborts the run.

use crate::config::ProviderConfig;
use anyhow::{Context, Result};
use modgraph::{CreatedResource, Error, Provider, ResolvedResource, TagFilter};
use nodeboot::RetryPolicy;
use nodeboot::retry::LogCallback;
use std::time::Duration;

const USER_AGENT: &str = concat!("tierstack/", env!("CARGO_PKG_VERSION"));

pub struct HttpProvider {
    agent: ureq::Agent,
    endpoint: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Map a transport or status error onto the provider error kinds
pub fn classify(operation: &str, err: ureq::Error) -> Error {
    let message = format!("{operation}: {err}");
    match err {
        ureq::Error::StatusCode(code) if code >= 500 || code == 429 => Error::ProviderTransient { message },
        ureq::Error::StatusCode(_) => Error::ProviderPermanent { message },
        ureq::Error::Io(_) | ureq::Error::Timeout(_) | ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            Error::ProviderTransient { message }
        }
        _ => Error::ProviderPermanent { message },
    }
}

impl HttpProvider {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, policy: RetryPolicy) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(60)))
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            policy,
        }
    }

    /// Build from the `[provider]` section; the token is read from its env var
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .context("provider.endpoint is required for the http provider")?;
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            log::warn!("{} is not set, calling the provisioning API without a token", config.token_env);
        }
        let policy = RetryPolicy::fixed(config.retry_attempts, Duration::from_secs(config.retry_delay_secs));
        Ok(Self::new(endpoint, token, policy))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn resources_url(&self) -> String {
        format!("{}/resources", self.endpoint)
    }

    fn resource_url(&self, id: &str) -> String {
        format!("{}/resources/{id}", self.endpoint)
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn retrying<T>(&self, operation: impl FnMut() -> modgraph::Result<T>) -> modgraph::Result<T> {
        nodeboot::with_retry_if(&self.policy, Some(&LogCallback), Error::is_retryable, operation)
    }

    fn send_create(&self, resource: &ResolvedResource) -> modgraph::Result<CreatedResource> {
        let mut request = self.agent.post(&self.resources_url()).header("User-Agent", USER_AGENT);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        let operation = format!("create {} {}", resource.kind, resource.name);
        request
            .send_json(resource)
            .map_err(|e| classify(&operation, e))?
            .body_mut()
            .read_json()
            .map_err(|e| classify(&operation, e))
    }

    fn send_query(&self, filter: &TagFilter) -> modgraph::Result<Vec<CreatedResource>> {
        let mut request = self.agent.get(&self.resources_url()).header("User-Agent", USER_AGENT);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        if let Some(kind) = filter.kind {
            request = request.query("kind", kind.as_str());
        }
        for (key, value) in &filter.tags {
            request = request.query("tag", format!("{key}={value}"));
        }
        request
            .call()
            .map_err(|e| classify("query", e))?
            .body_mut()
            .read_json()
            .map_err(|e| classify("query", e))
    }

    fn send_delete(&self, id: &str) -> modgraph::Result<()> {
        let mut request = self.agent.delete(&self.resource_url(id)).header("User-Agent", USER_AGENT);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        match request.call() {
            Ok(_) | Err(ureq::Error::StatusCode(404)) => Ok(()),
            Err(e) => Err(classify(&format!("delete {id}"), e)),
        }
    }
}

impl Provider for HttpProvider {
    fn create(&self, resource: &ResolvedResource) -> modgraph::Result<CreatedResource> {
        // A retried create must not duplicate: adopt whatever already carries
        // this logical name.
        let logical = TagFilter::logical(resource);
        if !logical.tags.is_empty()
            && let Some(existing) = self.query(&logical)?.into_iter().next()
        {
            log::debug!("adopting existing {} {}", existing.kind, existing.id);
            return Ok(existing);
        }
        self.retrying(|| self.send_create(resource))
    }

    fn query(&self, filter: &TagFilter) -> modgraph::Result<Vec<CreatedResource>> {
        self.retrying(|| self.send_query(filter))
    }

    fn delete(&self, id: &str) -> modgraph::Result<()> {
        self.retrying(|| self.send_delete(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgraph::ResourceKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_classify_status_codes() {
        assert!(classify("create", ureq::Error::StatusCode(503)).is_retryable());
        assert!(classify("create", ureq::Error::StatusCode(429)).is_retryable());
        assert!(!classify("create", ureq::Error::StatusCode(400)).is_retryable());
        assert!(!classify("create", ureq::Error::StatusCode(403)).is_retryable());
    }

    #[test]
    fn test_classify_transport_errors() {
        assert!(classify("query", ureq::Error::HostNotFound).is_retryable());
        assert!(classify("query", ureq::Error::ConnectionFailed).is_retryable());
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let provider = HttpProvider::new("https://provision.example.com/v1/", None, RetryPolicy::no_retry());
        assert_eq!(provider.resources_url(), "https://provision.example.com/v1/resources");
        assert_eq!(provider.resource_url("vpc-1"), "https://provision.example.com/v1/resources/vpc-1");
    }

    #[test]
    fn test_debug_hides_token() {
        let provider = HttpProvider::new("http://localhost", Some("tok_secret".to_string()), RetryPolicy::no_retry());
        assert!(!format!("{provider:?}").contains("tok_secret"));
    }

    #[test]
    fn test_unreachable_endpoint_is_transient() {
        let provider = HttpProvider::new("http://127.0.0.1:9", None, RetryPolicy::fixed(2, Duration::ZERO));
        let resource = ResolvedResource {
            name: "vpc".to_string(),
            kind: ResourceKind::Network,
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        let err = provider.create(&resource).unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
