//! Minimal multi-client chat over TCP.
//!
//! A server relays one line of text per message to every connected client
//! and remembers which login id each connection announced. Clients send
//! console input as chat lines and handle `#` commands locally. Each module
//! focuses on a concrete responsibility:
//!
//! - [`transport`] owns sockets and tasks: the listening side with its
//!   connection registry and broadcast fan-out, and a single client
//!   connection. Both report what happens as events over channels.
//! - [`echo_server`] applies the login protocol and routes messages; it also
//!   runs operator commands.
//! - [`chat_client`] performs the login handshake, runs user commands and
//!   renders server messages.
//! - [`server_console`] and [`client_console`] drive those cores from
//!   console input on a single task, which keeps display output and session
//!   state serialized.
//! - [`command`] parses `#` commands, [`message`] holds the line protocol,
//!   [`display`] the output sinks, [`console`] the stdin reader and [`cli`]
//!   the command-line arguments.

pub mod chat_client;
pub mod cli;
pub mod client_console;
pub mod command;
pub mod console;
pub mod display;
pub mod echo_server;
pub mod message;
pub mod server_console;
pub mod transport;
