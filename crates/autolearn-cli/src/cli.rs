use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "autolearn")]
#[command(about = "Complete pending training courses and exams with a live event stream")]
#[command(version)]
pub struct Args {
    /// Configuration file (defaults to ./autolearn.json, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run all tasks for the user named in the request body
    Run {
        /// JSON request body file; read from stdin when omitted
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Client address recorded in the log files
        #[arg(long, env = "AUTOLEARN_CLIENT_IP")]
        client_ip: Option<String>,
    },

    /// Browse persisted run logs
    Logs {
        #[command(subcommand)]
        command: LogsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    /// List log files, newest first
    List {
        /// List error logs instead of the full logs
        #[arg(long)]
        errors: bool,
    },

    /// Print one log file
    Show {
        /// File name, e.g. log_2024-05-01.txt
        name: String,
    },
}
