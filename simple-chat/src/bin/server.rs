use anyhow::Result;
use clap::Parser;
use tracing::error;

use simple_chat::{
    cli::{ServerArgs, init_tracing},
    console::stdin_lines,
    server_console::ServerConsole,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = ServerArgs::parse();
    let console = match ServerConsole::start(args.port()).await {
        Ok(console) => console,
        Err(err) => {
            error!("{err:?}");
            println!("Error: Can't setup connection! Terminating server console.");
            std::process::exit(1);
        }
    };

    console.run(stdin_lines()?).await
}
