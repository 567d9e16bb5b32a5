use aerolog::error::AppError;
use clap::{Args, Parser, Subcommand};

use crate::demo::{run_compliance_evaluate, run_demo, ComplianceEvaluateArgs, DemoArgs};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "aerolog",
    about = "Scan ingestion and maintenance-limit reference status for aircraft records",
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
    /// Evaluate maintenance limits without running the service
    Compliance {
        #[command(subcommand)]
        command: ComplianceCommand,
    },
    /// Walk one aircraft through scan, review, apply, and compliance in memory
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ComplianceCommand {
    /// Print the reference status for a set of limit inputs
    Evaluate(ComplianceEvaluateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Compliance {
            command: ComplianceCommand::Evaluate(args),
        } => run_compliance_evaluate(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
