use clap::Parser;
use imgaudit_lib::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    imgaudit_lib::run(Cli::parse()).await
}
