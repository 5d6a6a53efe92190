//! Region auto-detection through the directory service.
//!
//! One query per (access key, bucket) pair; the parsed topology is cached
//! in-process for the remainder of the process lifetime or until the caller
//! invalidates it. A failed query is a hard error — callers decide what to
//! do, nothing here retries in a loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blocklift_protocol::QueryResponse;
use tracing::{debug, warn};

use crate::{Region, RegionError, ReqInfo};

/// Directory-service connection settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory endpoints (scheme + host), tried in order.
    pub endpoints: Vec<String>,
    /// Per-query budget.
    pub timeout: Duration,
}

impl DiscoveryConfig {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Queries and caches region topologies.
#[derive(Debug)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    cache: Mutex<HashMap<String, Vec<Region>>>,
}

impl DiscoveryClient {
    pub fn new(config: DiscoveryConfig) -> Result<Self, RegionError> {
        if config.endpoints.is_empty() {
            return Err(RegionError::InvalidConfig(
                "no directory endpoints configured".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegionError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            endpoints: config.endpoints,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the region list for `req`, querying the directory service on
    /// first use and the cache afterwards.
    pub async fn regions(&self, req: &ReqInfo) -> Result<Vec<Region>, RegionError> {
        let key = cache_key(req);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }

        let regions = self.query(req).await?;

        self.cache
            .lock()
            .unwrap()
            .insert(key, regions.clone());
        Ok(regions)
    }

    /// Forgets every cached topology.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Forgets the cached topology for one (access key, bucket) pair.
    pub fn invalidate_for(&self, req: &ReqInfo) {
        self.cache.lock().unwrap().remove(&cache_key(req));
    }

    async fn query(&self, req: &ReqInfo) -> Result<Vec<Region>, RegionError> {
        let mut last_error = String::new();

        for endpoint in &self.endpoints {
            let url = format!("{}/v4/query", endpoint.trim_end_matches('/'));
            debug!(endpoint = %url, bucket = %req.bucket, "querying region topology");

            let result = self
                .http
                .get(&url)
                .query(&[("ak", req.access_key.as_str()), ("bucket", req.bucket.as_str())])
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(endpoint = %url, error = %e, "directory endpoint unreachable");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(endpoint = %url, status = status.as_u16(), "directory query rejected");
                last_error = format!("status {status}: {body}");
                continue;
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| RegionError::Discovery(e.to_string()))?;
            let parsed: QueryResponse = serde_json::from_slice(&body)
                .map_err(|e| RegionError::Discovery(format!("bad topology payload: {e}")))?;

            let regions: Vec<Region> = parsed.hosts.iter().map(Region::from_query).collect();
            if regions.is_empty() {
                return Err(RegionError::Discovery("topology names no regions".into()));
            }
            return Ok(regions);
        }

        Err(RegionError::Discovery(format!(
            "all directory endpoints failed (last: {last_error})"
        )))
    }
}

/// A region source resolved on demand from the directory service.
#[derive(Debug, Clone)]
pub struct AutoRegion {
    discovery: Arc<DiscoveryClient>,
    req: ReqInfo,
}

impl AutoRegion {
    pub fn new(discovery: Arc<DiscoveryClient>, req: ReqInfo) -> Self {
        Self { discovery, req }
    }

    /// Resolves the region list, consulting the shared cache.
    pub async fn resolve(&self) -> Result<Vec<Region>, RegionError> {
        self.discovery.regions(&self.req).await
    }
}

fn cache_key(req: &ReqInfo) -> String {
    format!("{}:{}", req.access_key, req.bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TOPOLOGY: &str = r#"{
        "hosts": [
            {
                "region": "east-1",
                "ttl": 86400,
                "up": {
                    "acc": {"main": ["upload.example.com"]},
                    "src": {"main": ["up.example.com"]}
                }
            },
            {
                "region": "west-2",
                "up": {"src": {"main": ["up-w.example.com"]}}
            }
        ]
    }"#;

    /// HTTP stub serving `body` for every request, counting hits.
    async fn stub_server(
        status: u16,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_srv = Arc::clone(&hits);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hits_srv.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 8192];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, hits, handle)
    }

    fn req() -> ReqInfo {
        ReqInfo::new("ak", "bucket")
    }

    #[tokio::test]
    async fn first_query_parses_topology() {
        let (url, _, handle) = stub_server(200, TOPOLOGY).await;
        let client = DiscoveryClient::new(DiscoveryConfig::new([url])).unwrap();

        let regions = client.regions(&req()).await.unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name(), "east-1");
        assert_eq!(
            regions[0].up_hosts(),
            vec!["upload.example.com", "up.example.com"]
        );
        assert_eq!(regions[1].name(), "west-2");

        handle.abort();
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let (url, hits, handle) = stub_server(200, TOPOLOGY).await;
        let client = DiscoveryClient::new(DiscoveryConfig::new([url])).unwrap();

        client.regions(&req()).await.unwrap();
        client.regions(&req()).await.unwrap();
        client.regions(&req()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A different bucket is a different cache key.
        client
            .regions(&ReqInfo::new("ak", "other"))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_query() {
        let (url, hits, handle) = stub_server(200, TOPOLOGY).await;
        let client = DiscoveryClient::new(DiscoveryConfig::new([url])).unwrap();

        client.regions(&req()).await.unwrap();
        client.invalidate();
        client.regions(&req()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn rejected_query_is_a_hard_error() {
        let (url, _, handle) = stub_server(500, "oops").await;
        let client = DiscoveryClient::new(DiscoveryConfig::new([url])).unwrap();

        let err = client.regions(&req()).await.unwrap_err();
        assert!(matches!(err, RegionError::Discovery(_)), "{err:?}");

        handle.abort();
    }

    #[tokio::test]
    async fn empty_topology_is_a_hard_error() {
        let (url, _, handle) = stub_server(200, r#"{"hosts":[]}"#).await;
        let client = DiscoveryClient::new(DiscoveryConfig::new([url])).unwrap();

        let err = client.regions(&req()).await.unwrap_err();
        assert!(matches!(err, RegionError::Discovery(_)));

        handle.abort();
    }

    #[tokio::test]
    async fn falls_through_to_backup_endpoint() {
        let dead = {
            // Bind then drop to get a port that refuses connections.
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            format!("http://127.0.0.1:{port}")
        };
        let (alive, hits, handle) = stub_server(200, TOPOLOGY).await;

        let client = DiscoveryClient::new(DiscoveryConfig::new([dead, alive])).unwrap();
        let regions = client.regions(&req()).await.unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[test]
    fn no_endpoints_is_invalid_config() {
        let err = DiscoveryClient::new(DiscoveryConfig::new(Vec::<String>::new())).unwrap_err();
        assert!(matches!(err, RegionError::InvalidConfig(_)));
    }
}
