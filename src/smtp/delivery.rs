use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::dns::Resolver;
use crate::error::{Error, Result};
use crate::smtp::relay::RelayClient;
use crate::smtp::transaction::MailTransaction;
use crate::storage::MailStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REMOTE_SMTP_PORT: u16 = 25;

/// Routes a completed transaction recipient by recipient: local mailboxes
/// get envelope headers and a store write, everything else is relayed over
/// outbound SMTP after MX/A resolution.
pub struct DeliveryPipeline {
    config: Arc<ServerConfig>,
    store: Arc<MailStore>,
    resolver: Resolver,
}

impl DeliveryPipeline {
    pub fn new(config: Arc<ServerConfig>, store: Arc<MailStore>, resolver: Resolver) -> Self {
        Self {
            config,
            store,
            resolver,
        }
    }

    /// Deliver to every recipient, aggregating failures: the caller answers
    /// 250 only when the whole envelope went through, 451 otherwise.
    pub async fn deliver(&self, transaction: &MailTransaction) -> Result<()> {
        if !transaction.has_recipients() {
            return Err(Error::Syntax("no recipients in transaction".to_string()));
        }

        let mut first_failure = None;
        for recipient in &transaction.recipients {
            if let Err(err) = self.deliver_one(&transaction.sender, recipient, &transaction.data).await {
                warn!(%recipient, %err, "delivery failed");
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn deliver_one(&self, sender: &str, recipient: &str, data: &[u8]) -> Result<()> {
        let Some((_, domain)) = recipient.split_once('@') else {
            return Err(Error::Syntax(format!("invalid recipient {recipient}")));
        };

        if self.config.is_local_domain(domain) {
            self.deliver_local(sender, recipient, data)
        } else {
            self.deliver_remote(sender, recipient, domain, data).await
        }
    }

    /// Local delivery: prepend the envelope headers and store into INBOX.
    fn deliver_local(&self, sender: &str, recipient: &str, data: &[u8]) -> Result<()> {
        let username = recipient.split('@').next().unwrap_or(recipient);
        if !self.config.is_local_user(username) {
            // The original server drops mail for unknown local users on the
            // floor; keep that, but leave a trace.
            warn!(recipient, "discarding mail for unknown local user");
            return Ok(());
        }

        let mut content = Vec::with_capacity(data.len() + 64);
        content.extend_from_slice(format!("Return-Path: <{sender}>\r\n").as_bytes());
        content.extend_from_slice(format!("Delivered-To: {recipient}\r\n").as_bytes());
        content.extend_from_slice(data);

        let uid = self.store.save_email(username, "INBOX", &content)?;
        info!(recipient, uid, size = content.len(), "delivered locally");
        Ok(())
    }

    /// Remote delivery: MX lookup with bare-domain fallback, A resolution,
    /// then the outbound SMTP dialog on port 25.
    async fn deliver_remote(
        &self,
        sender: &str,
        recipient: &str,
        domain: &str,
        data: &[u8],
    ) -> Result<()> {
        let host = match self.resolver.resolve_mx(domain).await {
            Some(mx) => mx,
            None => {
                info!(domain, "no MX record, falling back to A");
                domain.to_string()
            }
        };

        let address = self
            .resolver
            .resolve_a(&host)
            .await
            .ok_or_else(|| Error::Resolve(host.clone()))?;

        let stream = timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((address.as_str(), REMOTE_SMTP_PORT)),
        )
        .await
        .map_err(|_| Error::Relay {
            host: host.clone(),
            reason: "connect timeout".to_string(),
        })?
        .map_err(|e| Error::Relay {
            host: host.clone(),
            reason: e.to_string(),
        })?;

        RelayClient::new(stream, &self.config.domain, &host)
            .relay_message(sender, recipient, data)
            .await?;

        info!(recipient, host = %host, "relayed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    fn pipeline() -> (TempDir, DeliveryPipeline, Arc<MailStore>) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ServerConfig::new("uliege.be", 4));
        let store = Arc::new(MailStore::new(dir.path()));
        let resolver = Resolver::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let pipeline = DeliveryPipeline::new(config, store.clone(), resolver);
        (dir, pipeline, store)
    }

    fn transaction(recipient: &str) -> MailTransaction {
        MailTransaction {
            sender: "x@ext.com".to_string(),
            recipients: vec![recipient.to_string()],
            data: b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
        }
    }

    #[tokio::test]
    async fn local_delivery_adds_envelope_headers() {
        let (_dir, pipeline, store) = pipeline();
        pipeline.deliver(&transaction("dcd@uliege.be")).await.unwrap();

        let messages = store.list_messages("dcd", "INBOX").unwrap();
        assert_eq!(messages.len(), 1);
        let content = store.read_message("dcd", &messages[0].path).unwrap();
        let text = String::from_utf8(content).unwrap();
        assert!(text.starts_with("Return-Path: <x@ext.com>\r\nDelivered-To: dcd@uliege.be\r\n"));
        assert!(text.ends_with("hello\r\n"));
    }

    #[tokio::test]
    async fn localhost_domain_counts_as_local() {
        let (_dir, pipeline, store) = pipeline();
        pipeline.deliver(&transaction("vj@localhost")).await.unwrap();
        assert_eq!(store.list_messages("vj", "INBOX").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_local_user_is_dropped_silently() {
        let (_dir, pipeline, store) = pipeline();
        pipeline.deliver(&transaction("ghost@uliege.be")).await.unwrap();
        assert!(store.list_messages("ghost", "INBOX").unwrap().is_empty());
    }

    #[tokio::test]
    async fn sequential_deliveries_get_increasing_uids() {
        let (_dir, pipeline, store) = pipeline();
        pipeline.deliver(&transaction("dcd@uliege.be")).await.unwrap();
        pipeline.deliver(&transaction("dcd@uliege.be")).await.unwrap();

        let uids: Vec<u32> = store
            .list_messages("dcd", "INBOX")
            .unwrap()
            .iter()
            .map(|m| m.uid)
            .collect();
        assert_eq!(uids, vec![1, 2]);
    }

    #[tokio::test]
    async fn recipient_without_domain_fails_the_envelope() {
        let (_dir, pipeline, _store) = pipeline();
        assert!(pipeline.deliver(&transaction("nodomain")).await.is_err());
    }
}
