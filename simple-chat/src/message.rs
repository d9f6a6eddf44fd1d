//! Line-oriented wire protocol shared by the chat server and client.
//!
//! Every payload travels as one UTF-8 line. The helpers here build the few
//! payloads the protocol defines and read/write them over tokio streams.

use std::io;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Prefix of the greeting a client sends right after connecting.
pub const LOGIN_COMMAND: &str = "#login";

/// Prefix carried by every payload the operator console broadcasts.
pub const SERVER_MSG_PREFIX: &str = "SERVER MSG> ";

/// Name used for a sender that never logged in.
pub const ANONYMOUS: &str = "anonymous";

/// Removes every literal `#login` from a user supplied login id.
///
/// Nothing else is touched, whitespace included.
pub fn sanitize_login_id(raw: &str) -> String {
    raw.replace(LOGIN_COMMAND, "")
}

/// Greeting sent by the client: `#login<id>` with no separating space.
pub fn login_greeting(login_id: &str) -> String {
    format!("{LOGIN_COMMAND}{login_id}")
}

/// Extracts the login id from a `#login` payload.
///
/// Accepts both `#login<id>` and `#login <id>`. Returns `None` when the
/// payload is not a login command at all.
pub fn parse_login(payload: &str) -> Option<&str> {
    payload
        .strip_prefix(LOGIN_COMMAND)
        .map(|rest| rest.trim_start_matches(' ').trim_end())
}

pub fn logged_on(login_id: &str) -> String {
    format!("{login_id} has logged on.")
}

pub fn chat_line(login_id: Option<&str>, text: &str) -> String {
    format!("{}: {text}", login_id.unwrap_or(ANONYMOUS))
}

pub fn operator_broadcast(text: &str) -> String {
    format!("{SERVER_MSG_PREFIX}{text}")
}

/// Reads the next non-empty payload, or `None` once the peer closed the stream.
///
/// Built on [`Lines::next_line`], so it can sit in a `select!` branch without
/// losing partially read data.
pub async fn read_payload<R>(lines: &mut Lines<R>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(trimmed.to_string()));
    }
    Ok(None)
}

pub async fn write_payload<W>(writer: &mut W, payload: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // One payload per line; embedded line breaks would split it in two on the other side.
    let mut encoded = payload.trim_end_matches(LINE_ENDINGS).replace(LINE_ENDINGS, " ");
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await
}
