use clap::{Parser, Subcommand};

/// Command-line interface definition for rShiftlog
/// CLI application to record shifts as contiguous time blocks
#[derive(Parser)]
#[command(
    name = "rshiftlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Shift time tracking: log time blocks, fix gaps and overlaps, submit shifts for approval",
    long_about = None
)]
pub struct Cli {
    /// Override database path (useful for tests or custom DB)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Run in test mode (no config file update)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Manage the configuration file (view or edit)
    Config {
        #[arg(long = "print", help = "Print the current configuration file")]
        print_config: bool,

        #[arg(
            long = "edit",
            help = "Edit the configuration file (default editor: $EDITOR, or nano/notepad)"
        )]
        edit_config: bool,

        #[arg(
            long = "editor",
            help = "Specify the editor to use (vim, nano, or custom path)"
        )]
        editor: Option<String>,
    },

    /// Record the current shift interactively
    Track,

    /// List stored shifts
    List {
        #[arg(long = "json", help = "Print shifts and their blocks as JSON")]
        json: bool,
    },

    /// Print or manage the internal log table
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },
}
