/// SMTP reply codes and texts (RFC 5321).
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Format the reply for transmission, CRLF-terminated.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }

    /// 220 - initial greeting.
    pub fn service_ready(domain: &str) -> Self {
        Self::new(220, format!("{domain} Simple Mail Transfer Service Ready"))
    }

    /// 250 - HELO/EHLO acknowledgement.
    pub fn hello(domain: &str) -> Self {
        Self::new(250, domain)
    }

    /// 250 - generic success.
    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// 250 - message handed off to delivery.
    pub fn accepted() -> Self {
        Self::new(250, "OK Message accepted for delivery")
    }

    /// 354 - switch to data mode.
    pub fn start_mail_input() -> Self {
        Self::new(354, "End data with <CRLF>.<CRLF>")
    }

    /// 221 - closing.
    pub fn bye() -> Self {
        Self::new(221, "Bye")
    }

    /// 451 - delivery failed for at least one recipient.
    pub fn local_error() -> Self {
        Self::new(451, "Requested action aborted: local error in processing")
    }

    /// 500 - unknown verb.
    pub fn unrecognized() -> Self {
        Self::new(500, "Unrecognized command")
    }

    /// 501 - verb recognized, parameters not.
    pub fn bad_parameters() -> Self {
        Self::new(501, "Syntax error in parameters")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_crlf_terminated() {
        let bytes = SmtpResponse::ok().to_bytes();
        assert_eq!(bytes, b"250 OK\r\n");
    }

    #[test]
    fn greeting_names_the_domain() {
        let text = String::from_utf8(SmtpResponse::service_ready("uliege.be").to_bytes()).unwrap();
        assert_eq!(text, "220 uliege.be Simple Mail Transfer Service Ready\r\n");
    }
}
