use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};

/// Preview congregational schedules and daily zmanim.
#[derive(Parser, Debug)]
#[command(name = "zmanim", version, about = "Preview congregational schedules and daily zmanim")]
pub struct CliArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every reference time for one date at the configured location
    Times {
        /// Date to compute (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Path to a TOML config file (default: Lakewood, NJ)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Materialize rules from a JSON file over a date range and print the occurrences
    Preview {
        /// JSON array of rule definitions
        #[arg(long)]
        rules: PathBuf,

        /// First date to materialize; rules are created as of this day
        #[arg(long)]
        from: NaiveDate,

        /// Last date to materialize
        #[arg(long)]
        through: NaiveDate,

        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of <year>.json Hebcal files (overrides the config)
        #[arg(long)]
        feed_dir: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl CliArgs {
    /// Default log filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
