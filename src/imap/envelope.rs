//! ENVELOPE construction from RFC 5322 headers.

use super::response::{quoted, quoted_or_nil};

/// Build the ten-field ENVELOPE structure from a header block:
/// `(date subject from sender reply-to to cc bcc in-reply-to message-id)`.
///
/// Sender and reply-to fall back to the from field when absent, as clients
/// expect.
pub fn envelope(headers: &str) -> String {
    let fields = HeaderFields::parse(headers);

    let from = &fields.from;
    let sender = if fields.sender.is_empty() { from } else { &fields.sender };
    let reply_to = if fields.reply_to.is_empty() { from } else { &fields.reply_to };

    format!(
        "({} {} {} {} {} {} {} {} {} {})",
        quoted_or_nil(&fields.date),
        quoted_or_nil(&fields.subject),
        address_list(from),
        address_list(sender),
        address_list(reply_to),
        address_list(&fields.to),
        address_list(&fields.cc),
        address_list(&fields.bcc),
        quoted_or_nil(&fields.in_reply_to),
        quoted_or_nil(&fields.message_id),
    )
}

#[derive(Default)]
struct HeaderFields {
    date: String,
    subject: String,
    from: String,
    sender: String,
    reply_to: String,
    to: String,
    cc: String,
    bcc: String,
    in_reply_to: String,
    message_id: String,
}

impl HeaderFields {
    /// Walk the header block, folding continuation lines into the previous
    /// header.
    fn parse(headers: &str) -> Self {
        let mut fields = Self::default();
        let mut name = String::new();
        let mut value = String::new();

        for line in headers.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                value.push(' ');
                value.push_str(line.trim());
            } else if let Some((header, rest)) = line.split_once(':') {
                fields.save(&name, &value);
                name = header.to_lowercase();
                value = rest.trim().to_string();
            }
        }
        fields.save(&name, &value);
        fields
    }

    fn save(&mut self, name: &str, value: &str) {
        let slot = match name {
            "date" => &mut self.date,
            "subject" => &mut self.subject,
            "from" => &mut self.from,
            "sender" => &mut self.sender,
            "reply-to" => &mut self.reply_to,
            "to" => &mut self.to,
            "cc" => &mut self.cc,
            "bcc" => &mut self.bcc,
            "in-reply-to" => &mut self.in_reply_to,
            "message-id" => &mut self.message_id,
            _ => return,
        };
        *slot = value.to_string();
    }
}

/// Render a comma-separated address header as an IMAP address list, or NIL
/// when the header is absent.
fn address_list(header: &str) -> String {
    if header.is_empty() {
        return "NIL".to_string();
    }
    let rendered: Vec<String> = header.split(',').map(|a| address(a.trim())).collect();
    format!("({})", rendered.join(" "))
}

/// One address as `(display-name NIL local-part domain)`, handling both
/// `Name <local@domain>` and bare `local@domain` shapes.
fn address(raw: &str) -> String {
    let (display, email) = match (raw.find('<'), raw.find('>')) {
        (Some(lt), Some(gt)) if lt < gt => {
            (raw[..lt].trim().trim_matches('"'), &raw[lt + 1..gt])
        }
        _ => ("", raw),
    };

    match email.split_once('@') {
        Some((local, domain)) => format!(
            "({} NIL {} {})",
            quoted_or_nil(display),
            quoted(local),
            quoted(domain)
        ),
        None => "NIL".to_string(),
    }
}
