/// IMAP response formatting.

/// Capabilities advertised in the greeting and on CAPABILITY.
pub const CAPABILITIES: &str = "IMAP4rev1 SASL-IR LOGIN-REFERRALS ID ENABLE IDLE LITERAL+";

pub fn ok(tag: &str, message: &str) -> String {
    format!("{tag} OK {message}\r\n")
}

pub fn no(tag: &str, message: &str) -> String {
    format!("{tag} NO {message}\r\n")
}

pub fn bad(tag: &str, message: &str) -> String {
    format!("{tag} BAD {message}\r\n")
}

pub fn untagged(response: &str) -> String {
    format!("* {response}\r\n")
}

pub fn bye(message: &str) -> String {
    format!("* BYE {message}\r\n")
}

/// The connection greeting, capability list included.
pub fn greeting(domain: &str) -> String {
    format!("* OK [CAPABILITY {CAPABILITIES}] {domain} IMAP4rev1 Service Ready\r\n")
}

/// The untagged response block of a successful SELECT.
pub fn select_block(exists: usize, uidnext: u32) -> String {
    let mut out = String::new();
    out.push_str(&untagged(&format!("{exists} EXISTS")));
    out.push_str(&untagged("0 RECENT"));
    out.push_str(&untagged("OK [UIDVALIDITY 1] UIDs valid"));
    out.push_str(&untagged(&format!("OK [UIDNEXT {uidnext}] Predicted next UID")));
    out.push_str(&untagged(
        "FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)",
    ));
    out.push_str(&untagged(
        "OK [PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft \\*)] Limited",
    ));
    out
}

/// One `* LIST` / `* LSUB` line.
pub fn list_line(verb: &str, has_children: bool, name: &str) -> String {
    let attrs = if has_children {
        "\\HasChildren"
    } else {
        "\\HasNoChildren"
    };
    untagged(&format!("{verb} ({attrs}) \"/\" \"{name}\""))
}

/// `* <msn> FETCH (...)` with pre-rendered parts.
pub fn fetch_line(msn: usize, parts: &str) -> String {
    untagged(&format!("{msn} FETCH ({parts})"))
}

pub fn expunge_line(msn: usize) -> String {
    untagged(&format!("{msn} EXPUNGE"))
}

/// Quote a string, escaping embedded quotes and backslashes.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Quote a value or render NIL when empty.
pub fn quoted_or_nil(s: &str) -> String {
    if s.is_empty() {
        "NIL".to_string()
    } else {
        quoted(s)
    }
}

/// Render a flag set as `(\Flag \Flag ...)`.
pub fn flag_list<'a>(flags: impl IntoIterator<Item = &'a str>) -> String {
    let joined = flags.into_iter().collect::<Vec<_>>().join(" ");
    format!("({joined})")
}

/// A single-part BODYSTRUCTURE for an RFC 5322 text message.
pub fn body_structure(size: u64, lines: usize) -> String {
    format!(
        "(\"text\" \"plain\" (\"charset\" \"us-ascii\") NIL NIL \"7bit\" {size} {lines})"
    )
}
