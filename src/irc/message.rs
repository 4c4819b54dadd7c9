//! Minimal IRC line handling: just enough of RFC 1459 for a relay bot.

/// Longest text we put in a single PRIVMSG/NOTICE, in bytes. Leaves room for
/// the command, target and the prefix the server prepends when relaying.
pub const MAX_TEXT_BYTES: usize = crate::dispatch::MAX_LINE_BYTES;

/// Longest line accepted from the server.
pub const MAX_LINE_BYTES: usize = 8192;

/// A parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse `[:prefix] COMMAND [params...] [:trailing]`. IRCv3 tags are
    /// skipped. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map(|(_, r)| r)?;
        }
        rest = rest.trim_start();

        let prefix = match rest.strip_prefix(':') {
            Some(p) => {
                let (prefix, r) = p.split_once(' ')?;
                rest = r;
                Some(prefix.to_string())
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split_whitespace();
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Something to write to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Privmsg { target: String, text: String },
    Notice { target: String, text: String },
    Join(String),
}

impl Outbound {
    /// Wire form without the line terminator. Text is expected to be one
    /// chunk from [`split_text`].
    pub fn to_line(&self) -> String {
        match self {
            Outbound::Privmsg { target, text } => {
                format!("PRIVMSG {} :{}", target, clean_text(text))
            }
            Outbound::Notice { target, text } => {
                format!("NOTICE {} :{}", target, clean_text(text))
            }
            Outbound::Join(channel) => format!("JOIN {}", channel),
        }
    }
}

/// Make arbitrary text safe for a single IRC line.
///
/// Line breaks become spaces and other control bytes except IRC formatting
/// codes are dropped.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\r' | '\n' => Some(' '),
            // bold, color, reset, reverse, italic, underline
            '\x02' | '\x03' | '\x0f' | '\x16' | '\x1d' | '\x1f' => Some(c),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Clean `text` and split it into chunks of at most [`MAX_TEXT_BYTES`],
/// breaking at the last space that fits when there is one. Nothing is
/// dropped except the spaces at the breaks.
pub fn split_text(text: &str) -> Vec<String> {
    let cleaned = clean_text(text);
    let mut chunks = Vec::new();
    let mut rest = cleaned.as_str();

    while rest.len() > MAX_TEXT_BYTES {
        let mut cut = MAX_TEXT_BYTES;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if let Some(space) = rest[..cut].rfind(' ').filter(|&i| i > 0) {
            cut = space;
        }
        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches(' ');
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let line = IrcLine::parse(":alice!a@host PRIVMSG #faction :!chat on\r\n").unwrap();
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.source_nick(), Some("alice"));
        assert_eq!(line.param(0), Some("#faction"));
        assert_eq!(line.param(1), Some("!chat on"));
    }

    #[test]
    fn test_parse_without_prefix() {
        let line = IrcLine::parse("PING :irc.example.net").unwrap();
        assert_eq!(line.prefix, None);
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, vec!["irc.example.net"]);
    }

    #[test]
    fn test_parse_numeric_and_tags() {
        let line =
            IrcLine::parse("@time=2024-01-01T00:00:00Z :srv 001 relay :Welcome to IRC").unwrap();
        assert_eq!(line.command, "001");
        assert_eq!(line.params, vec!["relay", "Welcome to IRC"]);
        assert_eq!(line.source_nick(), Some("srv"));
    }

    #[test]
    fn test_parse_blank() {
        assert!(IrcLine::parse("").is_none());
        assert!(IrcLine::parse("\r\n").is_none());
    }

    #[test]
    fn test_clean_text_strips_line_breaks() {
        assert_eq!(clean_text("a\r\nb\x00c"), "a  bc");
        assert_eq!(clean_text("\x02bold\x02"), "\x02bold\x02");
    }

    #[test]
    fn test_clean_text_keeps_long_text() {
        let long = "a".repeat(MAX_TEXT_BYTES * 3);
        assert_eq!(clean_text(&long), long);
    }

    #[test]
    fn test_split_short_text_is_one_chunk() {
        assert_eq!(split_text("hello there"), vec!["hello there"]);
        assert!(split_text("").is_empty());
    }

    #[test]
    fn test_split_long_text_loses_nothing() {
        let words: Vec<String> = (0..200).map(|n| format!("word{}", n)).collect();
        let text = words.join(" ");
        let chunks = split_text(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_TEXT_BYTES));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_split_without_spaces_respects_char_boundaries() {
        let long = "é".repeat(MAX_TEXT_BYTES);
        let chunks = split_text(&long);

        assert!(chunks.iter().all(|c| c.len() <= MAX_TEXT_BYTES));
        assert_eq!(chunks.concat(), long);
    }

    #[test]
    fn test_outbound_lines() {
        let msg = Outbound::Privmsg {
            target: "#f".into(),
            text: "hi\nthere".into(),
        };
        assert_eq!(msg.to_line(), "PRIVMSG #f :hi there");
        assert_eq!(Outbound::Join("#f".into()).to_line(), "JOIN #f");
    }
}
