//! Commands understood by the carousel firmware.
//!
//! On the wire a command is a single lowercase token followed by `\n`. The
//! link sends any string it is given; [`Command`] is the vocabulary the
//! firmware actually implements.

use std::fmt;
use std::str::FromStr;

/// Byte that ends every command on the wire.
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Number of carousel positions.
pub const POSITION_COUNT: u8 = 12;

/// A command the firmware implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Return to the home position
    Home,
    /// Ask the board to report its status fields
    Status,
    /// Stop any motion
    Stop,
    /// Open the door
    Open,
    /// Close the door
    Close,
    /// Seek the magnet
    Mag,
    /// Test the beam break sensor
    Beam,
    /// Move to position 1 through 12
    Position(u8),
}

impl Command {
    /// Every command, positions in order.
    pub fn all() -> Vec<Command> {
        let mut commands = vec![
            Command::Home,
            Command::Status,
            Command::Stop,
            Command::Open,
            Command::Close,
            Command::Mag,
            Command::Beam,
        ];
        commands.extend((1..=POSITION_COUNT).map(Command::Position));
        commands
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Home => f.write_str("home"),
            Command::Status => f.write_str("status"),
            Command::Stop => f.write_str("stop"),
            Command::Open => f.write_str("open"),
            Command::Close => f.write_str("close"),
            Command::Mag => f.write_str("mag"),
            Command::Beam => f.write_str("beam"),
            Command::Position(n) => write!(f, "p{}", n),
        }
    }
}

/// Text that is not in the firmware's command vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(
    /// The rejected token
    pub String,
);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let command = match token {
            "home" => Command::Home,
            "status" => Command::Status,
            "stop" => Command::Stop,
            "open" => Command::Open,
            "close" => Command::Close,
            "mag" => Command::Mag,
            "beam" => Command::Beam,
            _ => token
                .strip_prefix('p')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=POSITION_COUNT).contains(n))
                .map(Command::Position)
                .ok_or_else(|| UnknownCommand(token.to_string()))?,
        };
        Ok(command)
    }
}

/// Wire bytes for `command`: the text plus one terminator.
pub fn encode(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(COMMAND_TERMINATOR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for command in Command::all() {
            let text = command.to_string();
            assert_eq!(text.parse::<Command>(), Ok(command), "{}", text);
        }
        assert_eq!(Command::all().len(), 19);
    }

    #[test]
    fn test_positions_are_bounded() {
        assert_eq!("p12".parse(), Ok(Command::Position(12)));
        assert!("p0".parse::<Command>().is_err());
        assert!("p13".parse::<Command>().is_err());
        assert!("p".parse::<Command>().is_err());
        assert_eq!(
            "HOME".parse::<Command>(),
            Err(UnknownCommand("HOME".to_string()))
        );
    }

    #[test]
    fn test_encode_appends_single_newline() {
        assert_eq!(encode("home"), b"home\n");
        assert_eq!(encode("p7"), b"p7\n");
        assert_eq!(encode(""), b"\n");
    }
}
