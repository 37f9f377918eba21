use clap::Parser;
use tracing_subscriber::EnvFilter;

use fillsheet::cli::{self, Cli, Commands};
use fillsheet::reports::ReportParams;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Demo => cli::demo::run(),
        Commands::Report {
            kind,
            from_date,
            to_date,
            customer,
            vendor,
            basis,
            by_department,
            weeks,
            max_rows,
            format,
            output,
        } => cli::report::run(cli::report::ReportArgs {
            kind,
            params: ReportParams {
                from_date,
                to_date,
                customer,
                vendor,
                basis,
                by_department,
                weeks,
            },
            max_rows,
            format,
            output,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
