use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RESOLV_CONF;
use crate::dns::message::{self, TYPE_A, TYPE_MX};

/// How long to wait for each response datagram.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Query attempts before giving up.
const MAX_ATTEMPTS: usize = 3;

/// UDP responses are capped at the classic 512-byte message size; there is
/// no TCP fallback for truncated answers.
const RECEIVE_BUFFER: usize = 512;

const DNS_PORT: u16 = 53;

/// Raw-UDP stub resolver pointed at one recursive server.
///
/// Every failure mode (timeout, transaction ID mismatch, parse failure,
/// empty answer section) collapses to `None`; callers only ever see a
/// usable answer or its absence.
#[derive(Debug, Clone)]
pub struct Resolver {
    server: SocketAddr,
}

impl Resolver {
    pub fn new(server: IpAddr) -> Self {
        Self {
            server: SocketAddr::new(server, DNS_PORT),
        }
    }

    /// Pick the recursive server from `/etc/resolv.conf`, falling back to
    /// 8.8.8.8 when the file is unreadable or lists none.
    pub fn from_system() -> Self {
        let server = std::fs::read_to_string(RESOLV_CONF)
            .ok()
            .and_then(|text| parse_resolv_conf(&text))
            .unwrap_or_else(|| IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));
        Self::new(server)
    }

    /// Resolve the best (lowest-preference) mail exchanger of a domain.
    pub async fn resolve_mx(&self, domain: &str) -> Option<String> {
        let (packet, id) = self.query(domain, TYPE_MX).await?;
        let best = message::best_mx(&packet, id);
        debug!(domain, mx = best.as_deref(), "MX lookup");
        best
    }

    /// Resolve a hostname to a dotted-quad IPv4 address.
    pub async fn resolve_a(&self, name: &str) -> Option<String> {
        let (packet, id) = self.query(name, TYPE_A).await?;
        let address = message::first_a(&packet, id);
        debug!(name, address = address.as_deref(), "A lookup");
        address
    }

    /// Send one query, retrying on timeout or socket failure. Returns the
    /// raw response plus the transaction ID it must carry.
    async fn query(&self, name: &str, qtype: u16) -> Option<(Vec<u8>, u16)> {
        for attempt in 1..=MAX_ATTEMPTS {
            let id: u16 = rand::random();
            let request = message::build_query(id, name, qtype);

            match self.exchange(&request).await {
                Ok(response) => return Some((response, id)),
                Err(err) => {
                    warn!(name, attempt, %err, "DNS exchange failed");
                }
            }
        }
        None
    }

    async fn exchange(&self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(self.server).await?;
        socket.send(request).await?;

        let mut buffer = vec![0u8; RECEIVE_BUFFER];
        let received = timeout(RECEIVE_TIMEOUT, socket.recv(&mut buffer))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "DNS receive timeout"))??;
        buffer.truncate(received);
        Ok(buffer)
    }
}

/// First uncommented `nameserver` directive, if any.
fn parse_resolv_conf(text: &str) -> Option<IpAddr> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let rest = line.strip_prefix("nameserver")?;
            rest.trim().parse().ok()
        })
}
