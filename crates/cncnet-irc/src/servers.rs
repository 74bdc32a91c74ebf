//! Candidate server resolution and latency ranking.
//!
//! Every configured host is resolved to all of its addresses. Duplicate
//! addresses are dropped, the remaining addresses are measured concurrently
//! with a bounded timeout each, and the results are ordered:
//!
//! 1. IPv6, responsive, ascending latency
//! 2. IPv4, responsive, ascending latency
//! 3. IPv6, unresponsive
//! 4. IPv4, unresponsive
//!
//! Addresses that failed a connection attempt during this run are skipped
//! until every candidate has failed, at which point the skip-list is cleared.

use std::collections::HashSet;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::task::JoinSet;

/// A candidate IRC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    /// Hostname or literal address.
    pub host: String,
    /// Name shown while connecting.
    pub display_name: String,
    /// Ports to try, in order.
    pub ports: Vec<u16>,
}

impl Server {
    /// Create a server entry.
    pub fn new(host: impl Into<String>, display_name: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            host: host.into(),
            display_name: display_name.into(),
            ports,
        }
    }
}

/// Measures round-trip latency to an address.
///
/// Returns `None` when the address did not answer within `timeout`.
pub trait LatencyProbe: Send + Sync {
    fn probe(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<Duration>> + Send + '_>>;
}

/// Latency probe that times a TCP connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProbe;

impl LatencyProbe for TcpConnectProbe {
    fn probe(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<Duration>> + Send + '_>> {
        Box::pin(async move {
            let start = Instant::now();
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => Some(start.elapsed()),
                Ok(Err(e)) => {
                    tracing::debug!("Probe to {addr} failed: {e}");
                    None
                }
                Err(_) => {
                    tracing::debug!("Probe to {addr} timed out");
                    None
                }
            }
        })
    }
}

/// One resolved address of a server with its measured latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The server this address belongs to.
    pub server: Server,
    /// Resolved address.
    pub address: IpAddr,
    /// Probe result; `None` for unresponsive.
    pub latency: Option<Duration>,
}

impl Candidate {
    fn rank(&self) -> (u8, Duration) {
        let group = match (self.latency.is_some(), self.address.is_ipv6()) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        (group, self.latency.unwrap_or(Duration::MAX))
    }
}

/// Sort candidates into connection order.
pub fn order_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by_key(Candidate::rank);
}

/// Resolves, probes and ranks servers; remembers addresses that failed.
#[derive(Debug, Default)]
pub struct ServerSelector {
    failed: HashSet<IpAddr>,
}

impl ServerSelector {
    /// Create a selector with an empty skip-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that connecting to `address` failed.
    pub fn mark_failed(&mut self, address: IpAddr) {
        self.failed.insert(address);
    }

    /// Whether `address` is on the skip-list.
    pub fn is_failed(&self, address: &IpAddr) -> bool {
        self.failed.contains(address)
    }

    /// Forget every failed address.
    pub fn clear_failed(&mut self) {
        self.failed.clear();
    }

    /// Resolve every server, then drop duplicates and failed addresses.
    ///
    /// If every resolved address is on the skip-list, the list is cleared and
    /// all addresses are returned.
    pub async fn resolve(&mut self, servers: &[Server]) -> Vec<(Server, IpAddr)> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for server in servers {
            let port = server.ports.first().copied().unwrap_or(6667);
            match tokio::net::lookup_host((server.host.as_str(), port)).await {
                Ok(addrs) => {
                    for addr in addrs {
                        if seen.insert(addr.ip()) {
                            resolved.push((server.clone(), addr.ip()));
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to resolve {}: {e}", server.host),
            }
        }

        self.filter_failed(resolved)
    }

    fn filter_failed(&mut self, resolved: Vec<(Server, IpAddr)>) -> Vec<(Server, IpAddr)> {
        if !resolved.is_empty() && resolved.iter().all(|(_, ip)| self.failed.contains(ip)) {
            tracing::info!("Every server failed; clearing the skip-list");
            self.failed.clear();
            return resolved;
        }
        resolved
            .into_iter()
            .filter(|(_, ip)| !self.failed.contains(ip))
            .collect()
    }

    /// Resolve, measure and rank. All addresses are measured at once, so
    /// ranking takes at most about one `timeout`.
    pub async fn rank(
        &mut self,
        servers: &[Server],
        latency: Arc<dyn LatencyProbe>,
        timeout: Duration,
    ) -> Vec<Candidate> {
        let resolved = self.resolve(servers).await;
        let mut candidates = measure_all(resolved, latency, timeout).await;
        order_candidates(&mut candidates);
        for c in &candidates {
            tracing::debug!(
                "Candidate {} ({}): {:?}",
                c.server.display_name,
                c.address,
                c.latency
            );
        }
        candidates
    }
}

async fn measure_all(
    resolved: Vec<(Server, IpAddr)>,
    latency: Arc<dyn LatencyProbe>,
    timeout: Duration,
) -> Vec<Candidate> {
    let mut tasks = JoinSet::new();
    for (index, (server, address)) in resolved.iter().enumerate() {
        let port = server.ports.first().copied().unwrap_or(6667);
        let addr = SocketAddr::new(*address, port);
        let latency = Arc::clone(&latency);
        tasks.spawn(async move { (index, latency.probe(addr, timeout).await) });
    }

    let mut results = vec![None; resolved.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, measured)) => results[index] = measured,
            Err(e) => tracing::warn!("Latency task failed: {e}"),
        }
    }

    // Results keep resolution order so equal ranks sort stably.
    resolved
        .into_iter()
        .zip(results)
        .map(|((server, address), latency)| Candidate {
            server,
            address,
            latency,
        })
        .collect()
}
