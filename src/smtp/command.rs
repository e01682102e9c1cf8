/// SMTP command parsing (RFC 5321 subset).

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    /// HELO or EHLO with the client's name.
    Hello(String),
    /// MAIL FROM with the extracted reverse-path address.
    MailFrom(String),
    /// RCPT TO with the extracted forward-path address.
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// MAIL/RCPT missing the `:` separator.
    BadParameters,
    /// Anything else.
    Unknown(String),
}

/// Parse one command line.
pub fn parse_command(input: &str) -> SmtpCommand {
    let input = input.trim_end_matches(['\r', '\n']);
    let upper = input.trim().to_uppercase();

    if upper.starts_with("HELO") || upper.starts_with("EHLO") {
        let name = input.trim()[4..].trim().to_string();
        return SmtpCommand::Hello(name);
    }
    if upper.starts_with("MAIL") {
        return match input.find(':') {
            Some(colon) => SmtpCommand::MailFrom(extract_address(&input[colon + 1..])),
            None => SmtpCommand::BadParameters,
        };
    }
    if upper.starts_with("RCPT") {
        return match input.find(':') {
            Some(colon) => SmtpCommand::RcptTo(extract_address(&input[colon + 1..])),
            None => SmtpCommand::BadParameters,
        };
    }

    match upper.as_str() {
        "DATA" => SmtpCommand::Data,
        "RSET" => SmtpCommand::Rset,
        "NOOP" => SmtpCommand::Noop,
        "QUIT" => SmtpCommand::Quit,
        _ => SmtpCommand::Unknown(input.to_string()),
    }
}

/// Clean an envelope address: everything after the separator with angle
/// brackets and surrounding whitespace removed.
fn extract_address(raw: &str) -> String {
    raw.trim().replace(['<', '>'], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_helo_and_ehlo() {
        assert_eq!(
            parse_command("HELO client.example.com\r\n"),
            SmtpCommand::Hello("client.example.com".to_string())
        );
        assert_eq!(
            parse_command("ehlo relay.example.org"),
            SmtpCommand::Hello("relay.example.org".to_string())
        );
    }

    #[test]
    fn parse_mail_from_strips_brackets() {
        assert_eq!(
            parse_command("MAIL FROM:<sender@example.com>"),
            SmtpCommand::MailFrom("sender@example.com".to_string())
        );
    }

    #[test]
    fn parse_mail_from_tolerates_spacing_and_case() {
        assert_eq!(
            parse_command("mail from: <x@ext.com> "),
            SmtpCommand::MailFrom("x@ext.com".to_string())
        );
    }

    #[test]
    fn parse_rcpt_to() {
        assert_eq!(
            parse_command("RCPT TO:<dcd@uliege.be>"),
            SmtpCommand::RcptTo("dcd@uliege.be".to_string())
        );
    }

    #[test]
    fn mail_without_colon_is_a_parameter_error() {
        assert_eq!(parse_command("MAIL FROM x"), SmtpCommand::BadParameters);
        assert_eq!(parse_command("RCPT TO"), SmtpCommand::BadParameters);
    }

    #[test]
    fn parse_bare_verbs() {
        assert_eq!(parse_command("DATA"), SmtpCommand::Data);
        assert_eq!(parse_command("rset"), SmtpCommand::Rset);
        assert_eq!(parse_command("QUIT\r\n"), SmtpCommand::Quit);
    }

    #[test]
    fn unknown_verbs_are_preserved() {
        match parse_command("STARTTLS") {
            SmtpCommand::Unknown(s) => assert_eq!(s, "STARTTLS"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }
}
