//! # Terminator adapter
//!
//! Talks to the collocated HTTP terminator's Caddy-style admin API to add
//! and remove reverse-proxy routes for a tunnel's public host. Calls are
//! made synchronously from inside the registry's write-lock section
//! (spec.md §4.2) so a route is never left dangling for a tunnel the
//! registry doesn't know about, or vice versa.

use serde_json::json;
use thiserror::Error;

const ROUTES_PATH: &str = "/config/apps/http/servers/srv0/routes";

#[derive(Debug, Error)]
pub enum TerminatorError {
    #[error("request to terminator failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("terminator rejected the request with status {0}")]
    BadStatus(reqwest::StatusCode),
}

/// Thin client over the terminator's admin API. Cheap to clone — wraps a
/// pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TerminatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl TerminatorClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Adds a reverse-proxy route for `host` pointing at `127.0.0.1:port`.
    /// The route is explicitly non-terminal so later routes (and the
    /// terminator's own TLS handling) still apply.
    pub async fn add_route(&self, host: &str, port: u16) -> Result<(), TerminatorError> {
        let route = json!({
            "match": [{ "host": [host] }],
            "handle": [{
                "handler": "reverse_proxy",
                "upstreams": [{ "dial": format!("127.0.0.1:{port}") }],
                "transport": { "protocol": "http", "versions": ["1.1"] },
            }],
            "terminal": false,
        });

        let url = format!("{}{ROUTES_PATH}", self.base_url);
        let resp = self.http.post(&url).json(&route).send().await?;
        if !resp.status().is_success() {
            return Err(TerminatorError::BadStatus(resp.status()));
        }
        Ok(())
    }

    /// Removes the route for `host`, if one exists. A host with no
    /// matching route is not an error — it means there is nothing left to
    /// clean up, which happens on double-teardown.
    pub async fn delete_route_by_host(&self, host: &str) -> Result<(), TerminatorError> {
        let url = format!("{}{ROUTES_PATH}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(TerminatorError::BadStatus(resp.status()));
        }
        let routes: Vec<serde_json::Value> = resp.json().await?;

        let Some(index) = routes.iter().position(|r| route_matches_host(r, host)) else {
            return Ok(());
        };

        let delete_url = format!("{url}/{index}");
        let resp = self.http.delete(&delete_url).send().await?;
        if !resp.status().is_success() {
            return Err(TerminatorError::BadStatus(resp.status()));
        }
        Ok(())
    }
}

fn route_matches_host(route: &serde_json::Value, host: &str) -> bool {
    route["match"]
        .as_array()
        .into_iter()
        .flatten()
        .any(|m| {
            m["host"]
                .as_array()
                .into_iter()
                .flatten()
                .any(|h| h.as_str() == Some(host))
        })
}
