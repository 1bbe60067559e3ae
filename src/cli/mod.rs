//! CLI Module
//!
//! Command-line interface for rendering and inspecting Mixgraph sessions.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mixgraph - offline bounce and inspection of multitrack sessions
#[derive(Parser, Debug)]
#[command(name = "mixgraph-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a session to a WAV file
    #[command(name = "bounce")]
    Bounce {
        /// Session JSON document
        session: PathBuf,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Transport position to start from, in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Length to render in seconds (defaults to the end of the last clip)
        #[arg(long)]
        duration: Option<f64>,

        /// Output bit depth (16, 24 or 32)
        #[arg(long, default_value_t = 24)]
        bit_depth: u16,
    },

    /// Print the compiled signal graph of a session as JSON
    #[command(name = "graph")]
    Graph {
        /// Session JSON document
        session: PathBuf,
    },

    /// Print the content key and sample store entry for a WAV file
    #[command(name = "inspect")]
    Inspect {
        /// WAV file to inspect
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounce() {
        let cli = Cli::try_parse_from([
            "mixgraph-cli",
            "bounce",
            "song.json",
            "-o",
            "out.wav",
            "--start",
            "1.5",
            "--bit-depth",
            "16",
        ])
        .unwrap();

        match cli.command {
            Commands::Bounce {
                session,
                output,
                start,
                duration,
                bit_depth,
            } => {
                assert_eq!(session, PathBuf::from("song.json"));
                assert_eq!(output, PathBuf::from("out.wav"));
                assert_eq!(start, 1.5);
                assert_eq!(duration, None);
                assert_eq!(bit_depth, 16);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["mixgraph-cli", "inspect", "a.wav", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_bounce_requires_output() {
        assert!(Cli::try_parse_from(["mixgraph-cli", "bounce", "song.json"]).is_err());
    }
}
