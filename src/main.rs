// TermLink - Serial and TCP terminal for embedded devices
use clap::Parser;
use termlink::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    execute_command(args).await?;
    Ok(())
}
