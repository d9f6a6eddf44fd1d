use anyhow::Result;
use clap::Parser;
use tracing::error;

use simple_chat::{
    cli::{ClientArgs, init_tracing},
    client_console::ClientConsole,
    console::stdin_lines,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = ClientArgs::parse();
    let console = match ClientConsole::connect(&args.login_id, &args.host, args.port()).await {
        Ok(console) => console,
        Err(err) => {
            error!("{err:?}");
            println!("Error: Can't setup connection! Terminating client.");
            std::process::exit(1);
        }
    };

    console.run(stdin_lines()?).await
}
