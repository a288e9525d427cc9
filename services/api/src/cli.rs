use crate::demo::{run_demo, DemoArgs};
use crate::server;
use beneficiary_fraud::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Beneficiary Fraud Service",
    about = "Run the beneficiary identity verification service or replay a scripted journey",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one applicant through the subscription journey against fake vendors
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON file holding users to load into the in-memory store at startup
    #[arg(long)]
    pub(crate) seed_users: Option<PathBuf>,
    /// Directory receiving archived identity document pictures
    #[arg(long, default_value = "id-pictures")]
    pub(crate) pictures_dir: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| {
        Command::Serve(ServeArgs {
            pictures_dir: PathBuf::from("id-pictures"),
            ..ServeArgs::default()
        })
    });

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
