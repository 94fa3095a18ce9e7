//! Address book line protocol.
//!
//! One message per line, fields separated by single spaces.
//!
//! | Direction | Line |
//! |---|---|
//! | in | `C <host> <port>` |
//! | out | `H <node_id> <host> <port> <protocol_version> <software_version> <node_type>` |
//! | out | `R <host1> <port1> <host2> <port2> ...` |

use chia_peers_connection::{NodeInfo, Peer};
use std::fmt;
use std::str;

/// Longest line accepted from the address book, line ending excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits a byte stream into lines.
///
/// A partial line is held until the rest of it arrives. A line growing past
/// [`MAX_LINE_LENGTH`] is rejected once and its remaining bytes are dropped up
/// to the next newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Inside an overlong line, waiting for its newline.
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and take every line it completes, without the line ending.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Vec<u8>, MalformedCommand>> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(offset) = rest.iter().position(|b| *b == b'\n') {
            let head = &rest[..offset];
            rest = &rest[offset + 1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let length = self.pending.len() + head.len();
            if length > MAX_LINE_LENGTH {
                self.pending.clear();
                lines.push(Err(MalformedCommand::LineTooLong(length)));
                continue;
            }

            self.pending.extend_from_slice(head);
            let mut line = std::mem::take(&mut self.pending);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(Ok(line));
        }

        if !self.discarding {
            let length = self.pending.len() + rest.len();
            if length > MAX_LINE_LENGTH {
                self.pending.clear();
                self.discarding = true;
                lines.push(Err(MalformedCommand::LineTooLong(length)));
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        lines
    }

    /// Bytes of the partial line being held.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Forget any partial line, e.g. after the stream is replaced.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

/// Why an inbound line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedCommand {
    Empty,
    InvalidUtf8,
    UnknownCommand(String),
    /// The command letter was right but the field count was not.
    FieldCount(usize),
    InvalidPort(String),
    /// No newline within [`MAX_LINE_LENGTH`] bytes, holds the length seen.
    LineTooLong(usize),
}

impl fmt::Display for MalformedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedCommand::Empty => write!(f, "Empty line"),
            MalformedCommand::InvalidUtf8 => write!(f, "Line is not valid UTF-8"),
            MalformedCommand::UnknownCommand(command) => write!(f, "Unknown command {command:?}"),
            MalformedCommand::FieldCount(count) => {
                write!(f, "Expected 3 fields, got {count}")
            }
            MalformedCommand::InvalidPort(port) => write!(f, "Invalid port {port:?}"),
            MalformedCommand::LineTooLong(length) => {
                write!(f, "Line of {length} bytes exceeds {MAX_LINE_LENGTH}")
            }
        }
    }
}

impl std::error::Error for MalformedCommand {}

/// A request from the address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Crawl the peer.
    Crawl(Peer),
}

impl Command {
    /// Parse a single line, without its line ending.
    pub fn parse(line: &[u8]) -> Result<Self, MalformedCommand> {
        let line = str::from_utf8(line).map_err(|_| MalformedCommand::InvalidUtf8)?;
        let fields: Vec<&str> = line.split_whitespace().collect();

        match fields.as_slice() {
            [] => Err(MalformedCommand::Empty),
            ["C", host, port] => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| MalformedCommand::InvalidPort(port.to_string()))?;
                Ok(Command::Crawl(Peer::new(*host, port)))
            }
            ["C", ..] => Err(MalformedCommand::FieldCount(fields.len())),
            [command, ..] => Err(MalformedCommand::UnknownCommand(command.to_string())),
        }
    }
}

/// Results reported back to the address book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// A node completed the handshake.
    Handshake(NodeInfo),
    /// Addresses learned from a node. Never empty.
    Peers(Vec<Peer>),
}

impl Report {
    /// The line for this report, including the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Report::Handshake(node) => format!(
                "H {} {} {} {} {} {}\n",
                node.node_id,
                field(&node.peer.host),
                node.peer.port,
                field(&node.handshake.protocol_version),
                field(&node.handshake.software_version),
                node.handshake.node_type.name(),
            ),
            Report::Peers(peers) => {
                let mut line = String::from("R");
                for peer in peers {
                    line.push(' ');
                    line.push_str(&field(&peer.host));
                    line.push(' ');
                    line.push_str(&peer.port.to_string());
                }
                line.push('\n');
                line
            }
        }
    }
}

/// Make a remote controlled value safe to use as a single field.
fn field(value: &str) -> String {
    if value.is_empty() {
        return "-".to_string();
    }
    value
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chia_peers_connection::protocol::{Handshake, NodeType};
    use chia_peers_connection::NodeId;

    fn parse_all(buffer: &mut LineBuffer, chunk: &[u8]) -> Vec<Result<Command, MalformedCommand>> {
        buffer
            .push(chunk)
            .into_iter()
            .map(|line| line.and_then(|line| Command::parse(&line)))
            .collect()
    }

    #[test]
    fn test_line_reassembly() {
        let mut buffer = LineBuffer::new();
        assert!(parse_all(&mut buffer, b"C 1.1.1.1 80").is_empty());
        assert_eq!(buffer.pending(), b"C 1.1.1.1 80");

        let commands = parse_all(&mut buffer, b"0\nC 2.2.2.2 90\n");
        assert_eq!(
            commands,
            vec![
                Ok(Command::Crawl(Peer::new("1.1.1.1", 800))),
                Ok(Command::Crawl(Peer::new("2.2.2.2", 90))),
            ]
        );
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn test_crlf_and_ipv6() {
        let mut buffer = LineBuffer::new();
        let commands = parse_all(&mut buffer, b"C 2001:db8::1 8444\r\n");
        assert_eq!(
            commands,
            vec![Ok(Command::Crawl(Peer::new("2001:db8::1", 8444)))]
        );
    }

    #[test]
    fn test_malformed_commands() {
        assert_eq!(Command::parse(b""), Err(MalformedCommand::Empty));
        assert_eq!(Command::parse(b"   "), Err(MalformedCommand::Empty));
        assert_eq!(
            Command::parse(b"X 1.1.1.1 80"),
            Err(MalformedCommand::UnknownCommand("X".to_string()))
        );
        assert_eq!(
            Command::parse(b"C 1.1.1.1"),
            Err(MalformedCommand::FieldCount(2))
        );
        assert_eq!(
            Command::parse(b"C 1.1.1.1 80 extra"),
            Err(MalformedCommand::FieldCount(4))
        );
        assert_eq!(
            Command::parse(b"C 1.1.1.1 99999"),
            Err(MalformedCommand::InvalidPort("99999".to_string()))
        );
        assert_eq!(
            Command::parse(&[b'C', b' ', 0xff, b' ', b'1']),
            Err(MalformedCommand::InvalidUtf8)
        );
    }

    #[test]
    fn test_malformed_line_does_not_poison_buffer() {
        let mut buffer = LineBuffer::new();
        let commands = parse_all(&mut buffer, b"C nonsense\nC 3.3.3.3 8444\n");
        assert!(commands[0].is_err());
        assert_eq!(commands[1], Ok(Command::Crawl(Peer::new("3.3.3.3", 8444))));
    }

    #[test]
    fn test_overlong_line_is_rejected_once() {
        let mut buffer = LineBuffer::new();
        let filler = vec![b'x'; MAX_LINE_LENGTH];

        // Exactly at the limit is still held.
        assert!(parse_all(&mut buffer, &filler).is_empty());
        assert_eq!(buffer.pending().len(), MAX_LINE_LENGTH);

        let commands = parse_all(&mut buffer, b"xx");
        assert_eq!(
            commands,
            vec![Err(MalformedCommand::LineTooLong(MAX_LINE_LENGTH + 2))]
        );
        assert!(buffer.pending().is_empty());

        // The rest of the long line goes nowhere, the next line parses.
        assert!(parse_all(&mut buffer, &filler).is_empty());
        assert!(buffer.pending().is_empty());
        let commands = parse_all(&mut buffer, b"xxx\nC 4.4.4.4 8444\n");
        assert_eq!(commands, vec![Ok(Command::Crawl(Peer::new("4.4.4.4", 8444)))]);
    }

    #[test]
    fn test_overlong_line_within_one_chunk() {
        let mut buffer = LineBuffer::new();
        let mut chunk = vec![b'x'; MAX_LINE_LENGTH + 1];
        chunk.extend_from_slice(b"\nC 5.5.5.5 8444\n");

        let commands = parse_all(&mut buffer, &chunk);
        assert_eq!(
            commands,
            vec![
                Err(MalformedCommand::LineTooLong(MAX_LINE_LENGTH + 1)),
                Ok(Command::Crawl(Peer::new("5.5.5.5", 8444))),
            ]
        );
    }

    #[test]
    fn test_clear_ends_discarding() {
        let mut buffer = LineBuffer::new();
        parse_all(&mut buffer, &vec![b'x'; MAX_LINE_LENGTH + 1]);

        buffer.clear();
        let commands = parse_all(&mut buffer, b"C 6.6.6.6 8444\n");
        assert_eq!(commands, vec![Ok(Command::Crawl(Peer::new("6.6.6.6", 8444)))]);
    }

    #[test]
    fn test_handshake_line() {
        let node = NodeInfo {
            node_id: NodeId([0xab; 32]),
            peer: Peer::new("10.0.0.1", 8444),
            handshake: Handshake {
                network_id: "mainnet".to_string(),
                protocol_version: "0.0.36".to_string(),
                software_version: "2.4.1 beta\nR 6.6.6.6".to_string(),
                server_port: 8444,
                node_type: NodeType::Wallet,
                capabilities: vec![],
            },
        };

        let line = Report::Handshake(node).to_line();
        assert_eq!(
            line,
            format!(
                "H {} 10.0.0.1 8444 0.0.36 2.4.1_beta_R_6.6.6.6 WALLET\n",
                "ab".repeat(32)
            )
        );
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_peers_line() {
        let report = Report::Peers(vec![Peer::new("10.0.0.2", 8444), Peer::new("::1", 58444)]);
        assert_eq!(report.to_line(), "R 10.0.0.2 8444 ::1 58444\n");
    }

    #[test]
    fn test_empty_field_placeholder() {
        assert_eq!(field(""), "-");
        assert_eq!(field("a b\tc"), "a_b_c");
    }
}
