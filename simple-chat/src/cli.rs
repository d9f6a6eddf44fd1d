use clap::Parser;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run the chat server with an operator console", long_about = None)]
pub struct ServerArgs {
    /// Port to listen on. Falls back to 5555 when missing or not a valid port.
    pub port: Option<String>,
}

impl ServerArgs {
    pub fn port(&self) -> u16 {
        port_or_default(self.port.as_deref())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Join a chat server", long_about = None)]
pub struct ClientArgs {
    /// Login id announced to the other participants.
    pub login_id: String,

    /// Host name or address of the chat server.
    #[arg(default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port. Falls back to 5555 when missing or not a valid port.
    pub port: Option<String>,
}

impl ClientArgs {
    pub fn port(&self) -> u16 {
        port_or_default(self.port.as_deref())
    }
}

fn port_or_default(raw: Option<&str>) -> u16 {
    match raw.map(str::parse::<u16>) {
        Some(Ok(port)) => port,
        Some(Err(error)) => {
            warn!(?error, "invalid port argument, using {DEFAULT_PORT}");
            DEFAULT_PORT
        }
        None => DEFAULT_PORT,
    }
}

/// Sends logs to stderr so stdout stays a clean chat console.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
