use super::command::{parse_command, SmtpCommand};
use super::response::SmtpResponse;
use super::transaction::MailTransaction;

/// Inbound SMTP session states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmtpState {
    /// Parsing command verbs.
    Command,
    /// Accumulating message lines until the lone `.`.
    Data,
}

/// Outcome of feeding one line to the session.
///
/// When `completed` is set the terminating dot was just received: the
/// driver runs the delivery pipeline and answers 250 or 451 itself, which
/// is why `response` is empty in that case.
#[derive(Debug, Default)]
pub struct SmtpResult {
    pub response: Option<Vec<u8>>,
    pub should_close: bool,
    pub completed: Option<MailTransaction>,
}

impl SmtpResult {
    fn reply(response: SmtpResponse) -> Self {
        Self {
            response: Some(response.to_bytes()),
            ..Self::default()
        }
    }
}

/// Inbound SMTP state machine for a single connection. Sans-IO: the
/// connection handler feeds it lines and writes back whatever it returns.
pub struct SmtpSession {
    pub state: SmtpState,
    domain: String,
    transaction: MailTransaction,
}

impl SmtpSession {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            state: SmtpState::Command,
            domain: domain.into(),
            transaction: MailTransaction::new(),
        }
    }

    /// The 220 banner sent when the connection is established.
    pub fn greeting(&self) -> Vec<u8> {
        SmtpResponse::service_ready(&self.domain).to_bytes()
    }

    /// Called by the driver after it has delivered a completed transaction
    /// and replied; the envelope must not leak into the next message.
    pub fn finish_transaction(&mut self) {
        self.transaction.reset();
    }

    /// Process one line (without its CRLF).
    pub fn process_line(&mut self, line: &str) -> SmtpResult {
        match self.state {
            SmtpState::Data => self.process_data_line(line),
            SmtpState::Command => self.process_command(line),
        }
    }

    fn process_data_line(&mut self, line: &str) -> SmtpResult {
        if line == "." {
            self.state = SmtpState::Command;
            return SmtpResult {
                completed: Some(self.transaction.clone()),
                ..SmtpResult::default()
            };
        }

        // Transparency: the client doubled any leading dot, undo it here so
        // the stored message carries the original text.
        let line = line.strip_prefix('.').unwrap_or(line);
        self.transaction.data.extend_from_slice(line.as_bytes());
        self.transaction.data.extend_from_slice(b"\r\n");
        SmtpResult::default()
    }

    fn process_command(&mut self, line: &str) -> SmtpResult {
        match parse_command(line) {
            SmtpCommand::Hello(_) => SmtpResult::reply(SmtpResponse::hello(&self.domain)),
            SmtpCommand::MailFrom(address) => {
                self.transaction.sender = address;
                SmtpResult::reply(SmtpResponse::ok())
            }
            SmtpCommand::RcptTo(address) => {
                self.transaction.recipients.push(address);
                SmtpResult::reply(SmtpResponse::ok())
            }
            SmtpCommand::Data => {
                self.state = SmtpState::Data;
                self.transaction.data.clear();
                SmtpResult::reply(SmtpResponse::start_mail_input())
            }
            SmtpCommand::Rset => {
                self.transaction.reset();
                SmtpResult::reply(SmtpResponse::ok())
            }
            SmtpCommand::Noop => SmtpResult::reply(SmtpResponse::ok()),
            SmtpCommand::Quit => SmtpResult {
                response: Some(SmtpResponse::bye().to_bytes()),
                should_close: true,
                completed: None,
            },
            SmtpCommand::BadParameters => SmtpResult::reply(SmtpResponse::bad_parameters()),
            SmtpCommand::Unknown(_) => SmtpResult::reply(SmtpResponse::unrecognized()),
        }
    }
}
