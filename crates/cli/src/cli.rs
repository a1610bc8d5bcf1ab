//! Command line arguments and how they override the loaded configuration.

use clap::Parser;
use std::path::PathBuf;

use jsonify_core::Config;

/// jsonify - convert forensic artifacts to JSON
///
/// Detects the type of every file under the input (event logs, packet
/// captures, CSV/JSON/XML, text logs, PDF, DOCX, archives) and writes one
/// JSON document per file to the output directory.
#[derive(Parser, Debug)]
#[command(name = "jsonify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input path (file or directory)
    #[arg(short, long, value_name = "PATH", required_unless_present = "list_formats")]
    pub input: Option<PathBuf>,

    /// Output directory for JSON files
    #[arg(short, long, value_name = "DIR", required_unless_present = "list_formats")]
    pub output_dir: Option<PathBuf>,

    /// Also write master.json with every result
    #[arg(long)]
    pub combine: bool,

    /// Replace existing outputs (by default, already converted files are skipped)
    #[arg(long)]
    pub overwrite: bool,

    /// Only log errors and do not print the summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub silent: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only convert these types, e.g. `evtx,csv,log`
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// Number of concurrent workers (defaults to CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Packets decoded per capture file
    #[arg(long, value_name = "N")]
    pub max_packets: Option<usize>,

    /// Embed a base64 preview of unrecognised binaries
    #[arg(long)]
    pub include_base64: bool,

    /// Deepest archive nesting level that is still converted
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Write compact instead of indented JSON
    #[arg(long)]
    pub compact: bool,

    /// List supported formats and exit
    #[arg(long)]
    pub list_formats: bool,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Applies the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if self.combine {
            config.output.combine = true;
        }
        if self.overwrite {
            config.output.overwrite = true;
        }
        if self.compact {
            config.output.pretty = false;
        }
        if let Some(formats) = &self.formats {
            config.scheduler.formats = Some(formats.clone());
        }
        if let Some(workers) = self.workers {
            config.scheduler.workers = workers;
        }
        if let Some(max_packets) = self.max_packets {
            config.limits.max_packets = max_packets;
        }
        if self.include_base64 {
            config.limits.include_base64 = true;
        }
        if let Some(max_depth) = self.max_depth {
            config.limits.max_depth = max_depth;
        }
    }
}
