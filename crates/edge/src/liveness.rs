//! # Liveness prober
//!
//! One task per tunnel, armed right after `tunnel_opened` is sent. Probes
//! `https://<public_host>/` on a fixed interval; a 5xx response or any
//! non-timeout network error tears the tunnel down (spec.md §4.7). The
//! very first probe tolerates a TLS handshake error unconditionally — the
//! terminator's certificate for a freshly-added route may not be issued
//! yet, and that transient state must not be mistaken for a dead tunnel.

use crate::config::{PROBE_INTERVAL, PROBE_TIMEOUT};
use crate::registry::TunnelRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// What a single probe means for the tunnel's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Alive,
    Dead,
}

/// Runs until the tunnel disappears from `registry` or a probe judges it
/// dead, closing the tunnel in the latter case. Intended to be spawned and
/// tracked via [`TunnelRegistry::track_task`] so it's aborted on teardown.
pub async fn run(registry: Arc<TunnelRegistry>, tunnel_id: String, public_host: String) {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .expect("reqwest client builder should not fail with static config");
    let url = format!("https://{public_host}/");

    let mut first_probe = true;
    let mut ticker = tokio::time::interval(PROBE_INTERVAL);
    ticker.tick().await; // first tick fires immediately; skip it.

    loop {
        ticker.tick().await;
        if registry.get(&tunnel_id).await.is_none() {
            return;
        }

        let result = client.get(&url).send().await;
        if judge(&tunnel_id, result, first_probe) == Verdict::Dead {
            registry.close_tunnel(&tunnel_id).await;
            return;
        }
        first_probe = false;
    }
}

/// Decides whether one probe's outcome means the tunnel is still alive,
/// isolated from the ticker and the registry so it can be exercised
/// directly in tests without waiting on the real probe interval.
fn judge(tunnel_id: &str, result: reqwest::Result<reqwest::Response>, first_probe: bool) -> Verdict {
    match result {
        Ok(resp) if resp.status().is_server_error() => {
            warn!(tunnel_id, status = %resp.status(), "liveness probe got a server error, tearing down");
            Verdict::Dead
        }
        Ok(_) => Verdict::Alive,
        Err(err) if first_probe && err.is_connect() => {
            info!(tunnel_id, "first liveness probe failed to connect, tolerating it");
            Verdict::Alive
        }
        Err(err) if err.is_timeout() => {
            warn!(tunnel_id, %err, "liveness probe timed out, tolerating it");
            Verdict::Alive
        }
        Err(err) => {
            warn!(tunnel_id, %err, "liveness probe failed, tearing down");
            Verdict::Dead
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn client() -> reqwest::Client {
        reqwest::Client::builder().timeout(PROBE_TIMEOUT).build().unwrap()
    }

    async fn spawn_http_server(status: axum::http::StatusCode) -> String {
        let app = Router::new().route("/", get(move || async move { status }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn a_200_response_is_alive_on_any_probe() {
        let url = spawn_http_server(axum::http::StatusCode::OK).await;
        let client = client().await;
        let result = client.get(&url).send().await;
        assert_eq!(judge("t1", result, true), Verdict::Alive);
    }

    #[tokio::test]
    async fn a_500_response_is_dead_even_on_the_first_probe() {
        let url = spawn_http_server(axum::http::StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = client().await;
        let result = client.get(&url).send().await;
        assert_eq!(judge("t1", result, true), Verdict::Dead);
    }

    #[tokio::test]
    async fn a_connect_failure_is_tolerated_only_on_the_first_probe() {
        let client = client().await;
        // Nothing listens on this port.
        let unreachable = "http://127.0.0.1:1/";

        let first = client.get(unreachable).send().await;
        assert_eq!(judge("t1", first, true), Verdict::Alive);

        let second = client.get(unreachable).send().await;
        assert_eq!(judge("t1", second, false), Verdict::Dead);
    }
}
