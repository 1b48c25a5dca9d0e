//! Parsing of lines emitted by a store's `MONITOR` feed.
//!
//! A feed line looks like:
//!
//! ```text
//! 1700000000.000000 [0 127.0.0.1:1234] "SET" "foo" "bar"
//! ```
//!
//! Every argument of the observed command is wrapped in double quotes. The
//! unquoted prefix carries the timestamp, database index and client address.

/// Split a feed line into its tokens.
///
/// The line is split on the quote character and every fragment is trimmed of
/// surrounding whitespace, fragments which end up empty are dropped. The
/// whitespace separating two quoted arguments therefore vanishes, while
/// spaces inside an argument are kept.
///
/// Unbalanced quotes are handled on a best effort basis and never panic.
pub fn parse_command(line: &str) -> Vec<String> {
    line.split('"')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// A command observed on the feed.
///
/// Token 0 is the feed metadata, token 1 the command name and the rest are
/// the command arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    tokens: Vec<String>,
}

impl ParsedCommand {
    /// Parse a feed line, returning `None` when it carries no command.
    pub fn from_line(line: &str) -> Option<ParsedCommand> {
        let tokens = parse_command(line);
        if tokens.len() < 2 {
            return None;
        }
        Some(ParsedCommand { tokens })
    }

    pub fn metadata(&self) -> &str {
        &self.tokens[0]
    }

    pub fn name(&self) -> &str {
        &self.tokens[1]
    }

    pub fn name_lowercase(&self) -> String {
        self.name().to_lowercase()
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[2..]
    }

    /// The command as it should be replayed: name followed by its arguments.
    pub fn invocation(&self) -> Vec<String> {
        self.tokens[1..].to_vec()
    }
}
