use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stash",
    about = "Named object storage over directories and buckets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store location: a directory, or gs://bucket[/prefix]
    #[arg(short, long, global = true)]
    pub store: Option<String>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Describe one or more stores
    Ls(LsArgs),
    /// Print an object
    Get(GetArgs),
    /// Create or replace an object
    Put(PutArgs),
    /// Delete an object
    Rm(RmArgs),
    /// Show store metadata and counters
    Info(InfoArgs),
}

#[derive(Args)]
pub struct LsArgs {
    /// Store locations; defaults to the configured store
    pub locations: Vec<String>,
    /// List object names under each store
    #[arg(short, long)]
    pub details: bool,
}

#[derive(Args)]
pub struct GetArgs {
    pub name: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub name: String,
    /// JSON value to store
    #[arg(required_unless_present = "file")]
    pub value: Option<String>,
    /// Store the raw contents of a file instead, keeping its extension
    #[arg(short, long, conflicts_with = "value")]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub name: String,
}

#[derive(Args)]
pub struct InfoArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ls_defaults() {
        let cli = Cli::try_parse_from(["stash", "ls"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert!(args.locations.is_empty());
            assert!(!args.details);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_ls_locations_with_details() {
        let cli = Cli::try_parse_from(["stash", "ls", "--details", "/a", "gs://b/c"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.locations, vec!["/a", "gs://b/c"]);
            assert!(args.details);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_put_value() {
        let cli = Cli::try_parse_from(["stash", "put", "a", r#"{"x":1}"#]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.name, "a");
            assert_eq!(args.value.as_deref(), Some(r#"{"x":1}"#));
            assert!(args.file.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_put_file() {
        let cli = Cli::try_parse_from(["stash", "put", "logo", "--file", "logo.png"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.file, Some(PathBuf::from("logo.png")));
            assert!(args.value.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn put_needs_value_or_file() {
        assert!(Cli::try_parse_from(["stash", "put", "a"]).is_err());
        assert!(Cli::try_parse_from(["stash", "put", "a", "1", "--file", "x.txt"]).is_err());
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "stash", "get", "a", "--store", "/srv/things", "--config", "stash.toml", "-v",
            "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.store.as_deref(), Some("/srv/things"));
        assert_eq!(cli.config, Some(PathBuf::from("stash.toml")));
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Get(_)));
    }

    #[test]
    fn parse_rm_and_info() {
        let cli = Cli::try_parse_from(["stash", "rm", "a"]).unwrap();
        assert!(matches!(cli.command, Command::Rm(ref args) if args.name == "a"));
        let cli = Cli::try_parse_from(["stash", "info"]).unwrap();
        assert!(matches!(cli.command, Command::Info(_)));
    }
}
