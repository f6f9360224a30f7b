use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vf_core::{QueueName, Rendition};

#[derive(Parser)]
#[command(name = "videoflix")]
#[command(author, version, about = "Video streaming backend with on-demand HLS packaging")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (and embedded queue workers, if configured)
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run standalone queue workers
    Worker {
        /// Queues to process, highest priority first
        #[arg(long, num_args = 1.., value_parser = parse_queue, default_value = "default")]
        queues: Vec<QueueName>,

        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Exit when no jobs are left
        #[arg(long)]
        burst: bool,
    },

    /// Package HLS renditions for all videos with a file, or a single video
    CreateHls {
        /// Only this video
        #[arg(long)]
        video_id: Option<i64>,

        /// Rendition to create
        #[arg(long, value_enum, default_value_t = ResolutionArg::All)]
        resolution: ResolutionArg,

        /// Overwrite existing renditions
        #[arg(long)]
        force: bool,
    },

    /// Extract thumbnails for videos that have none
    GenerateThumbnails {
        /// Only this video
        #[arg(long)]
        video_id: Option<i64>,

        /// Regenerate even when a thumbnail exists
        #[arg(long)]
        force: bool,
    },

    /// Insert the demo catalog (skips titles that already exist)
    SeedVideos,

    /// Create an active staff superuser, or promote an existing account
    CreateSuperuser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Inspect or manage the job queues
    Queue {
        #[command(subcommand)]
        action: QueueCommand,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Queued job counts per queue
    Stats,
    /// Remove every queued job
    Clear,
    /// Requeue failed jobs
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    #[value(name = "480p")]
    P480,
    #[value(name = "720p")]
    P720,
    #[value(name = "1080p")]
    P1080,
    All,
}

impl ResolutionArg {
    pub fn renditions(self) -> Vec<Rendition> {
        match self {
            Self::P480 => vec![Rendition::P480],
            Self::P720 => vec![Rendition::P720],
            Self::P1080 => vec![Rendition::P1080],
            Self::All => Rendition::ALL.to_vec(),
        }
    }
}

fn parse_queue(s: &str) -> Result<QueueName, String> {
    s.parse().map_err(|e: vf_core::Error| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_queue_list() {
        let cli = Cli::parse_from(["videoflix", "worker", "--queues", "high", "low", "--burst"]);
        match cli.command {
            Commands::Worker { queues, workers, burst } => {
                assert_eq!(queues, vec![QueueName::High, QueueName::Low]);
                assert_eq!(workers, 1);
                assert!(burst);
            }
            _ => panic!("expected worker command"),
        }
    }

    #[test]
    fn worker_rejects_unknown_queue() {
        assert!(Cli::try_parse_from(["videoflix", "worker", "--queues", "urgent"]).is_err());
    }

    #[test]
    fn create_hls_defaults_to_all() {
        let cli = Cli::parse_from(["videoflix", "create-hls", "--video-id", "3"]);
        match cli.command {
            Commands::CreateHls { video_id, resolution, force } => {
                assert_eq!(video_id, Some(3));
                assert_eq!(resolution.renditions(), Rendition::ALL.to_vec());
                assert!(!force);
            }
            _ => panic!("expected create-hls command"),
        }
    }

    #[test]
    fn create_hls_single_resolution() {
        let cli = Cli::parse_from(["videoflix", "create-hls", "--resolution", "1080p"]);
        match cli.command {
            Commands::CreateHls { resolution, .. } => {
                assert_eq!(resolution, ResolutionArg::P1080);
            }
            _ => panic!("expected create-hls command"),
        }
        assert!(Cli::try_parse_from(["videoflix", "create-hls", "--resolution", "4k"]).is_err());
    }
}
