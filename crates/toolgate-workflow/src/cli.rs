//! Command-line arguments of the `toolgate-worker` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "toolgate-worker")]
#[command(about = "Run client-side tool activities from the shared workflow queue")]
#[command(version)]
pub struct WorkerCli {
    /// Worker configuration file (profile id and queues)
    #[arg(short, long, env = "TOOLGATE_WORKER_CONFIG")]
    pub config: PathBuf,

    /// Seconds each queue poll blocks for
    #[arg(long, default_value_t = 5)]
    pub poll_secs: u64,
}
