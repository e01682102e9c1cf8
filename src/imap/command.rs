/// IMAP command and argument parsing.

/// A tagged client command: `<tag> <verb> [args]`, with double-quoted
/// spans kept together as single arguments.
#[derive(Debug, Clone)]
pub struct ImapCommand {
    pub tag: String,
    pub name: String,
    pub args: Vec<String>,
}

impl ImapCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut quoted = false;

        for c in line.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    quoted = true;
                }
                ' ' if !in_quotes => {
                    if !current.is_empty() || quoted {
                        parts.push(std::mem::take(&mut current));
                    }
                    quoted = false;
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() || quoted {
            parts.push(current);
        }

        if parts.len() < 2 {
            return None;
        }
        let tag = parts.remove(0);
        let name = parts.remove(0).to_uppercase();
        Some(Self {
            tag,
            name,
            args: parts,
        })
    }
}

/// One element of a UID set.
#[derive(Debug, Clone, PartialEq)]
pub enum UidRange {
    Single(u32),
    Range(u32, u32),
    /// The maximum UID present (`*`).
    Max,
}

/// A UID set: `a`, `a,b,c`, `a:b`, `a:*`, `*`.
#[derive(Debug, Clone, PartialEq)]
pub struct UidSet(Vec<UidRange>);

impl UidSet {
    pub fn parse(s: &str) -> Option<Self> {
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part == "*" {
                ranges.push(UidRange::Max);
            } else if let Some((start, end)) = part.split_once(':') {
                let start = parse_bound(start)?;
                let end = parse_bound(end)?;
                ranges.push(UidRange::Range(start, end));
            } else {
                ranges.push(UidRange::Single(part.parse().ok()?));
            }
        }
        if ranges.is_empty() {
            return None;
        }
        Some(Self(ranges))
    }

    /// Whether a UID belongs to the set, with `*` resolved to `max`.
    pub fn contains(&self, uid: u32, max: u32) -> bool {
        self.0.iter().any(|range| match range {
            UidRange::Single(n) => uid == *n,
            UidRange::Max => uid == max,
            UidRange::Range(start, end) => {
                let start = if *start == u32::MAX { max } else { *start };
                let end = if *end == u32::MAX { max } else { *end };
                let (low, high) = if start <= end { (start, end) } else { (end, start) };
                uid >= low && uid <= high
            }
        })
    }
}

fn parse_bound(s: &str) -> Option<u32> {
    if s == "*" {
        Some(u32::MAX)
    } else {
        s.parse().ok()
    }
}

/// A `BODY[section]` request with its PEEK-ness.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySection {
    /// `""`, `"HEADER"` or `"TEXT"`.
    pub section: String,
    /// PEEK fetches do not set `\Seen`.
    pub peek: bool,
}

/// The data items of a FETCH, after macro expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchItems {
    pub flags: bool,
    pub internal_date: bool,
    pub rfc822_size: bool,
    pub envelope: bool,
    pub body_structure: bool,
    pub body_sections: Vec<BodySection>,
}

impl FetchItems {
    /// Parse a parenthesized item list or one of the macros ALL, FAST,
    /// FULL.
    pub fn parse(s: &str) -> Self {
        let mut items = Self::default();
        let s = s.trim();

        match s.to_uppercase().as_str() {
            "ALL" => {
                items.flags = true;
                items.internal_date = true;
                items.rfc822_size = true;
                items.envelope = true;
                return items;
            }
            "FAST" => {
                items.flags = true;
                items.internal_date = true;
                items.rfc822_size = true;
                return items;
            }
            "FULL" => {
                items.flags = true;
                items.internal_date = true;
                items.rfc822_size = true;
                items.envelope = true;
                items.body_structure = true;
                return items;
            }
            _ => {}
        }

        let s = s.trim_start_matches('(').trim_end_matches(')');
        let upper = s.to_uppercase();

        items.flags = upper.contains("FLAGS");
        items.internal_date = upper.contains("INTERNALDATE");
        items.rfc822_size = upper.contains("RFC822.SIZE");
        items.envelope = upper.contains("ENVELOPE");
        items.body_structure = upper.contains("BODYSTRUCTURE");

        // Collect every BODY[...] / BODY.PEEK[...] request in order.
        let mut search = 0;
        while let Some(found) = upper[search..].find("BODY") {
            let start = search + found;
            let after = &upper[start + 4..];
            let (peek, bracket_offset) = if after.starts_with(".PEEK[") {
                (true, start + 4 + 6)
            } else if after.starts_with('[') {
                (false, start + 4 + 1)
            } else {
                search = start + 4;
                continue;
            };
            let Some(close) = upper[bracket_offset..].find(']') else {
                break;
            };
            items.body_sections.push(BodySection {
                section: upper[bracket_offset..bracket_offset + close].to_string(),
                peek,
            });
            search = bracket_offset + close + 1;
        }

        items
    }
}
