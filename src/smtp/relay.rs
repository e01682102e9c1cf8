use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

/// How long to wait for each reply from the remote server.
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed (possibly multiline) SMTP reply.
#[derive(Debug)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

/// Outbound SMTP client used to relay a message to a remote exchanger.
///
/// Runs the fixed dialog: greeting, EHLO (HELO fallback), MAIL FROM,
/// RCPT TO, DATA with dot-stuffed body, QUIT. Any unexpected reply code
/// aborts the relay.
pub struct RelayClient<S: AsyncRead + AsyncWrite + Unpin> {
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: tokio::io::WriteHalf<S>,
    /// Our own domain, announced in EHLO/HELO.
    local_domain: String,
    /// Remote host name, for error reporting.
    host: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> RelayClient<S> {
    pub fn new(stream: S, local_domain: &str, host: &str) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            local_domain: local_domain.to_string(),
            host: host.to_string(),
        }
    }

    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::Relay {
            host: self.host.clone(),
            reason: reason.into(),
        }
    }

    async fn read_reply(&mut self) -> Result<SmtpReply> {
        let mut lines = Vec::new();
        let mut code = 0u16;

        loop {
            let mut line = String::new();
            let n = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .map_err(|_| self.fail("reply timeout"))?
                .map_err(|e| self.fail(e.to_string()))?;
            if n == 0 {
                return Err(self.fail("connection closed"));
            }
            if line.len() < 4 {
                return Err(self.fail(format!("short reply: {line:?}")));
            }

            let reply_code: u16 = line[..3]
                .parse()
                .map_err(|_| self.fail(format!("unparsable reply: {line:?}")))?;
            if code == 0 {
                code = reply_code;
            }
            let last = line.as_bytes()[3] == b' ';
            lines.push(line[4..].trim_end().to_string());
            if last {
                break;
            }
        }

        debug!(host = %self.host, code, "relay reply");
        Ok(SmtpReply { code, lines })
    }

    async fn command(&mut self, cmd: &str) -> Result<SmtpReply> {
        self.writer
            .write_all(format!("{cmd}\r\n").as_bytes())
            .await
            .map_err(|e| self.fail(e.to_string()))?;
        self.writer.flush().await.map_err(|e| self.fail(e.to_string()))?;
        self.read_reply().await
    }

    fn expect(&self, reply: SmtpReply, wanted: &[u16], step: &str) -> Result<SmtpReply> {
        if wanted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(self.fail(format!("{step} answered {}", reply.code)))
        }
    }

    /// Run the whole relay dialog for one recipient.
    pub async fn relay_message(
        mut self,
        sender: &str,
        recipient: &str,
        data: &[u8],
    ) -> Result<()> {
        let greeting = self.read_reply().await?;
        self.expect(greeting, &[220], "greeting")?;

        // EHLO preferred, HELO for servers that refuse it.
        let ehlo = self.command(&format!("EHLO {}", self.local_domain)).await?;
        if ehlo.code != 250 {
            let helo = self.command(&format!("HELO {}", self.local_domain)).await?;
            self.expect(helo, &[250], "HELO")?;
        }

        let mail = self.command(&format!("MAIL FROM:<{sender}>")).await?;
        self.expect(mail, &[250], "MAIL FROM")?;

        // 251 means "user not local; will forward", still a success.
        let rcpt = self.command(&format!("RCPT TO:<{recipient}>")).await?;
        self.expect(rcpt, &[250, 251], "RCPT TO")?;

        let data_reply = self.command("DATA").await?;
        self.expect(data_reply, &[354], "DATA")?;

        self.send_body(sender, recipient, data).await?;
        let accepted = self.read_reply().await?;
        self.expect(accepted, &[250], "end of data")?;

        // Best effort; the message is already accepted.
        let _ = self.command("QUIT").await;
        Ok(())
    }

    /// Stream the message body, adding minimal headers when absent and
    /// dot-stuffing every line that begins with a dot.
    async fn send_body(&mut self, sender: &str, recipient: &str, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data);

        if !text.to_lowercase().starts_with("from:") {
            let headers = format!("From: {sender}\r\nTo: {recipient}\r\n");
            self.writer
                .write_all(headers.as_bytes())
                .await
                .map_err(|e| self.fail(e.to_string()))?;
        }

        for line in text.lines() {
            let stuffed = if line.starts_with('.') {
                format!(".{line}\r\n")
            } else {
                format!("{line}\r\n")
            };
            self.writer
                .write_all(stuffed.as_bytes())
                .await
                .map_err(|e| self.fail(e.to_string()))?;
        }

        self.writer
            .write_all(b".\r\n")
            .await
            .map_err(|e| self.fail(e.to_string()))?;
        self.writer.flush().await.map_err(|e| self.fail(e.to_string()))?;
        Ok(())
    }
}
