//! `#`-prefixed console commands for the chat client and the server operator.
//!
//! A command line is split on whitespace. The first token picks the command
//! (exact, case-sensitive match) and the rest are positional arguments; any
//! extra arguments are ignored. Parse failures carry the text that is shown
//! to the user.

use thiserror::Error;

/// What a console loop should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

impl Control {
    pub fn is_shutdown(self) -> bool {
        matches!(self, Control::Shutdown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    Unknown(String),
    #[error("{command} requires an argument")]
    MissingArgument { command: &'static str },
    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

/// Commands typed into the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(String),
    SetPort(u16),
    Login,
    GetHost,
    GetPort,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (name, args) = tokenize(line);
        match name {
            "#quit" => Ok(ClientCommand::Quit),
            "#logoff" => Ok(ClientCommand::Logoff),
            "#sethost" => {
                let host = required(&args, "#sethost")?;
                Ok(ClientCommand::SetHost(host.to_string()))
            }
            "#setport" => parse_port(&args, "#setport").map(ClientCommand::SetPort),
            "#login" => Ok(ClientCommand::Login),
            "#gethost" => Ok(ClientCommand::GetHost),
            "#getport" => Ok(ClientCommand::GetPort),
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

/// Commands typed into the server operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    SetPort(u16),
    Start,
    GetPort,
}

impl ServerCommand {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (name, args) = tokenize(line);
        match name {
            "#quit" => Ok(ServerCommand::Quit),
            "#stop" => Ok(ServerCommand::Stop),
            "#close" => Ok(ServerCommand::Close),
            "#setport" => parse_port(&args, "#setport").map(ServerCommand::SetPort),
            "#start" => Ok(ServerCommand::Start),
            "#getport" => Ok(ServerCommand::GetPort),
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

pub fn is_command(line: &str) -> bool {
    line.starts_with('#')
}

fn tokenize(line: &str) -> (&str, Vec<&str>) {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

fn required<'a>(args: &[&'a str], command: &'static str) -> Result<&'a str, CommandError> {
    args.first()
        .copied()
        .ok_or(CommandError::MissingArgument { command })
}

fn parse_port(args: &[&str], command: &'static str) -> Result<u16, CommandError> {
    let raw = required(args, command)?;
    raw.parse()
        .map_err(|_| CommandError::InvalidPort(raw.to_string()))
}
