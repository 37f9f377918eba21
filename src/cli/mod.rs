pub mod demo;
pub mod init;
pub mod report;

use clap::{Parser, Subcommand, ValueEnum};

use crate::reports::{Basis, ReportKind};

#[derive(Parser)]
#[command(name = "fillsheet", about = "Grouped fill-rate and perfect-order workbooks for wholesale distribution.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Excel workbook, one worksheet per page
    #[default]
    Xlsx,
    /// Tables printed to the terminal
    Text,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for fillsheet data (default: ~/Documents/fillsheet)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Load a sample wholesale dataset to explore the reports.
    Demo,
    /// Build a report.
    Report {
        /// Report to build
        #[arg(value_enum)]
        kind: ReportKind,
        /// Start date: YYYY-MM-DD (requires --to)
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD (requires --from)
        #[arg(long = "to")]
        to_date: Option<String>,
        /// Limit to one customer (store-sales: one account)
        #[arg(long)]
        customer: Option<String>,
        /// Limit to one vendor
        #[arg(long)]
        vendor: Option<String>,
        /// Fill-rate basis
        #[arg(long, value_enum, default_value = "lines")]
        basis: Basis,
        /// Add a department level under each vendor (fill-rate)
        #[arg(long = "by-department")]
        by_department: bool,
        /// Weeks in the sales period (store-sales; default: length of the date range)
        #[arg(long)]
        weeks: Option<f64>,
        /// Rows per page before a new worksheet starts
        #[arg(long = "max-rows")]
        max_rows: Option<u32>,
        /// Output format
        #[arg(long, value_enum, default_value = "xlsx")]
        format: OutputFormat,
        /// Output file (default: <output_dir>/<kind>-YYYY-MM-DD.xlsx)
        #[arg(long)]
        output: Option<String>,
    },
}
