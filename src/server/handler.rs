use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::imap::ImapSession;
use crate::pop3::Pop3Session;
use crate::server::{ProtocolKind, ServerContext};
use crate::smtp::{SmtpResponse, SmtpSession};

/// Drive one accepted connection with the engine matching its protocol.
pub async fn handle_connection(
    kind: ProtocolKind,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
) -> io::Result<()> {
    debug!(protocol = kind.name(), %peer, "connection open");
    let result = match kind {
        ProtocolKind::Smtp => handle_smtp(stream, ctx).await,
        ProtocolKind::Imap => handle_imap(stream, ctx).await,
        ProtocolKind::Pop3 => handle_pop3(stream, ctx).await,
    };
    debug!(protocol = kind.name(), %peer, "connection closed");
    result
}

/// Read one CRLF line within the protocol's idle window. `Ok(None)` is
/// end-of-stream or an expired idle timer; both end the session cleanly.
async fn read_line<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    idle: Duration,
    buffer: &mut String,
) -> io::Result<Option<()>> {
    buffer.clear();
    match timeout(idle, reader.read_line(buffer)).await {
        Err(_) => Ok(None),
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(_)) => Ok(Some(())),
        Ok(Err(e)) => Err(e),
    }
}

async fn handle_smtp(stream: TcpStream, ctx: Arc<ServerContext>) -> io::Result<()> {
    let idle = ProtocolKind::Smtp.idle_timeout();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut session = SmtpSession::new(&ctx.config.domain);
    writer.write_all(&session.greeting()).await?;

    let mut line = String::new();
    loop {
        if read_line(&mut reader, idle, &mut line).await?.is_none() {
            break;
        }
        let result = session.process_line(line.trim_end_matches(['\r', '\n']));

        // A completed transaction runs the delivery pipeline; the verdict
        // becomes the one reply for the whole envelope.
        if let Some(transaction) = result.completed {
            let reply = match ctx.delivery.deliver(&transaction).await {
                Ok(()) => SmtpResponse::accepted(),
                Err(_) => SmtpResponse::local_error(),
            };
            session.finish_transaction();
            writer.write_all(&reply.to_bytes()).await?;
        }

        if let Some(response) = result.response {
            writer.write_all(&response).await?;
        }
        if result.should_close {
            break;
        }
    }
    Ok(())
}

async fn handle_imap(stream: TcpStream, ctx: Arc<ServerContext>) -> io::Result<()> {
    let idle = ProtocolKind::Imap.idle_timeout();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut session = ImapSession::new(ctx.config.clone(), ctx.store.clone());
    writer.write_all(&session.greeting()).await?;

    let mut line = String::new();
    loop {
        if read_line(&mut reader, idle, &mut line).await?.is_none() {
            break;
        }
        let result = session.process_line(line.trim_end_matches(['\r', '\n']));
        if !result.response.is_empty() {
            writer.write_all(&result.response).await?;
        }
        if result.should_close {
            break;
        }
    }
    Ok(())
}

async fn handle_pop3(stream: TcpStream, ctx: Arc<ServerContext>) -> io::Result<()> {
    let idle = ProtocolKind::Pop3.idle_timeout();
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut session = Pop3Session::new(ctx.config.clone(), ctx.store.clone());
    writer.write_all(&session.greeting()).await?;

    let mut line = String::new();
    loop {
        if read_line(&mut reader, idle, &mut line).await?.is_none() {
            break;
        }
        let result = session.process_line(line.trim_end_matches(['\r', '\n']));
        if !result.response.is_empty() {
            writer.write_all(&result.response).await?;
        }
        if result.should_close {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::dns::Resolver;
    use crate::smtp::DeliveryPipeline;
    use crate::storage::MailStore;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    /// Spin up one protocol on an ephemeral local port over a fresh store.
    async fn serve(kind: ProtocolKind) -> (SocketAddr, Arc<ServerContext>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ServerConfig::new("uliege.be", 4));
        let store = Arc::new(MailStore::new(dir.path()));
        let delivery = DeliveryPipeline::new(
            config.clone(),
            store.clone(),
            Resolver::new(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        );
        let ctx = Arc::new(ServerContext {
            config,
            store,
            delivery,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_ctx = ctx.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    break;
                };
                let ctx = accept_ctx.clone();
                tokio::spawn(handle_connection(kind, stream, peer, ctx));
            }
        });
        (addr, ctx, dir)
    }

    struct LineClient {
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    }

    impl LineClient {
        async fn connect(addr: SocketAddr) -> Self {
            let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: BufReader::new(read),
                writer,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        /// Read until the POP3 multi-line terminator.
        async fn recv_until_dot(&mut self) -> String {
            let mut out = String::new();
            loop {
                let line = self.recv().await;
                if line == ".\r\n" {
                    break;
                }
                out.push_str(&line);
            }
            out
        }
    }

    #[tokio::test]
    async fn imap_greeting_and_logout_over_the_wire() {
        let (addr, _ctx, _dir) = serve(ProtocolKind::Imap).await;
        let mut client = LineClient::connect(addr).await;

        let greeting = client.recv().await;
        assert!(greeting.starts_with("* OK [CAPABILITY IMAP4rev1 "));

        client.send("A1 LOGOUT").await;
        assert!(client.recv().await.starts_with("* BYE"));
        assert!(client.recv().await.starts_with("A1 OK LOGOUT completed"));
    }

    #[tokio::test]
    async fn smtp_delivery_then_pop3_retrieval() {
        // SMTP leg: deliver one message for dcd.
        let (smtp_addr, ctx, _dir) = serve(ProtocolKind::Smtp).await;
        let mut smtp = LineClient::connect(smtp_addr).await;
        assert!(smtp.recv().await.starts_with("220 uliege.be"));

        smtp.send("MAIL FROM:<x@ext.com>").await;
        assert!(smtp.recv().await.starts_with("250 OK"));
        smtp.send("RCPT TO:<dcd@uliege.be>").await;
        assert!(smtp.recv().await.starts_with("250 OK"));
        smtp.send("DATA").await;
        assert!(smtp.recv().await.starts_with("354"));
        smtp.send("Subject: hi").await;
        smtp.send("").await;
        smtp.send("hello").await;
        smtp.send(".").await;
        assert!(smtp
            .recv()
            .await
            .starts_with("250 OK Message accepted for delivery"));
        smtp.send("QUIT").await;
        assert!(smtp.recv().await.starts_with("221 Bye"));

        // POP3 leg against the same store.
        let pop3_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pop3_addr = pop3_listener.local_addr().unwrap();
        let pop3_ctx = ctx.clone();
        tokio::spawn(async move {
            let (stream, peer) = pop3_listener.accept().await.unwrap();
            let _ = handle_connection(ProtocolKind::Pop3, stream, peer, pop3_ctx).await;
        });

        let mut pop3 = LineClient::connect(pop3_addr).await;
        assert!(pop3.recv().await.starts_with("+OK POP3 server ready"));

        pop3.send("USER dcd@uliege.be").await;
        assert!(pop3.recv().await.starts_with("+OK"));
        pop3.send("PASS password").await;
        assert!(pop3.recv().await.starts_with("+OK"));

        pop3.send("STAT").await;
        let stat = pop3.recv().await;
        assert!(stat.starts_with("+OK 1 "), "{stat}");

        pop3.send("RETR 1").await;
        assert!(pop3.recv().await.starts_with("+OK"));
        let body = pop3.recv_until_dot().await;
        assert!(body.contains("Return-Path: <x@ext.com>"));
        assert!(body.contains("Delivered-To: dcd@uliege.be"));
        assert!(body.contains("hello"));

        pop3.send("QUIT").await;
        assert!(pop3.recv().await.starts_with("+OK Bye"));
    }

    #[tokio::test]
    async fn smtp_replies_451_when_every_recipient_fails() {
        let (addr, _ctx, _dir) = serve(ProtocolKind::Smtp).await;
        let mut smtp = LineClient::connect(addr).await;
        smtp.recv().await;

        smtp.send("MAIL FROM:<x@ext.com>").await;
        smtp.recv().await;
        smtp.send("RCPT TO:<no-at-sign>").await;
        smtp.recv().await;
        smtp.send("DATA").await;
        smtp.recv().await;
        smtp.send(".").await;
        assert!(smtp.recv().await.starts_with("451"));
    }
}
