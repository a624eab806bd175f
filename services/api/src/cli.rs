use crate::demo::{print_status_catalog, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use vos_dispatch::error::AppError;
use vos_dispatch::logistics::DispatchMode;

#[derive(Parser, Debug)]
#[command(
    name = "Vehicle Transport Dispatch",
    about = "Run the dispatch status engine over HTTP or walk through a scripted dispatch",
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
    /// Drive an in-memory fleet through a full dispatch and print every status change
    Demo(DemoArgs),
    /// Print the status vocabularies served at /api/v1/status/enums
    Enums,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override DISPATCH_MODE (routed or direct)
    #[arg(long, value_parser = parse_mode)]
    pub(crate) mode: Option<DispatchMode>,
}

pub(crate) fn parse_mode(raw: &str) -> Result<DispatchMode, String> {
    raw.parse::<DispatchMode>()
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Enums => print_status_catalog(),
    }
}
