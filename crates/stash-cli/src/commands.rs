use std::fs;
use std::io::{self, Write};

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};
use stash_store::{Contents, Store, StoreConfig};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let mut out = io::stdout().lock();
    match cli.command {
        Command::Ls(args) => cmd_ls(&mut out, &config, args, cli.format),
        Command::Get(args) => cmd_get(&mut out, &config, args, cli.format),
        Command::Put(args) => cmd_put(&mut out, &config, args, cli.format),
        Command::Rm(args) => cmd_rm(&mut out, &config, args, cli.format),
        Command::Info(_) => cmd_info(&mut out, &config, cli.format),
    }
}

/// The config file, if any, with `--store` taking precedence.
fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(location) = &cli.store {
        config.location = location.clone();
    }
    Ok(config)
}

fn open(config: &StoreConfig) -> anyhow::Result<Store> {
    Store::open_with(config).with_context(|| format!("opening store {}", config.location))
}

fn cmd_ls(
    out: &mut impl Write,
    config: &StoreConfig,
    args: LsArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let locations = if args.locations.is_empty() {
        vec![config.location.clone()]
    } else {
        args.locations
    };

    let mut listed = Vec::new();
    for location in locations {
        let config = StoreConfig {
            location,
            ..config.clone()
        };
        let mut store = open(&config)?;
        let names = store.list()?;
        match format {
            OutputFormat::Text => {
                writeln!(out, "{store}")?;
                if args.details {
                    for name in &names {
                        writeln!(out, "\t{name}")?;
                    }
                }
            }
            OutputFormat::Json => {
                let mut entry = json!({
                    "name": store.name(),
                    "location": store.location(),
                    "objects": names.len(),
                });
                if args.details {
                    entry["names"] = json!(names);
                }
                listed.push(entry);
            }
        }
    }
    if format == OutputFormat::Json {
        writeln!(out, "{}", serde_json::to_string_pretty(&listed)?)?;
    }
    Ok(())
}

fn cmd_get(
    out: &mut impl Write,
    config: &StoreConfig,
    args: GetArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut store = open(config)?;
    match store.read::<Value>(&args.name)? {
        Contents::Decoded(value) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        Contents::Raw { content_type, bytes } => match format {
            OutputFormat::Text => out.write_all(&bytes)?,
            OutputFormat::Json => {
                let summary = json!({
                    "name": args.name,
                    "content_type": content_type,
                    "size": bytes.len(),
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
            }
        },
    }
    Ok(())
}

fn cmd_put(
    out: &mut impl Write,
    config: &StoreConfig,
    args: PutArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut store = open(config)?;
    let object = match (&args.value, &args.file) {
        (_, Some(path)) => {
            let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no extension", path.display()))?;
            store.save_bytes(&args.name, &extension, &data)?
        }
        (Some(text), None) => {
            let value: Value = serde_json::from_str(text).context("value is not valid JSON")?;
            store.save(&args.name, &value)?
        }
        (None, None) => anyhow::bail!("nothing to store for {}", args.name),
    };

    match format {
        OutputFormat::Text => writeln!(
            out,
            "{} Saved {} ({} bytes)",
            "✓".green().bold(),
            object.name().bold(),
            object.size()
        )?,
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(&object.summary())?)?
        }
    }
    Ok(())
}

fn cmd_rm(
    out: &mut impl Write,
    config: &StoreConfig,
    args: RmArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut store = open(config)?;
    store.delete(&args.name)?;
    match format {
        OutputFormat::Text => writeln!(out, "{} Removed {}", "✓".green().bold(), args.name.bold())?,
        OutputFormat::Json => writeln!(out, "{}", json!({ "removed": args.name }))?,
    }
    Ok(())
}

fn cmd_info(out: &mut impl Write, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mut store = open(config)?;
    let objects = store.count()?;
    let bytes = store.index()?.total_bytes();
    match format {
        OutputFormat::Text => {
            writeln!(out, "Store {}", store.name().bold())?;
            writeln!(out, "  Location: {}", store.location().cyan())?;
            writeln!(out, "  Backend: {}", store.backend_kind())?;
            writeln!(out, "  Opened: {}", store.created())?;
            writeln!(out, "  Objects: {}", objects.to_string().bold())?;
            writeln!(out, "  Bytes: {bytes}")?;
        }
        OutputFormat::Json => {
            let info = json!({
                "name": store.name(),
                "location": store.location(),
                "backend": store.backend_kind(),
                "created": store.created(),
                "objects": objects,
                "bytes": bytes,
                "stats": store.stats(),
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use stash_store::name_from_path;
    use std::path::Path;

    fn config_at(path: &Path) -> StoreConfig {
        colored::control::set_override(false);
        StoreConfig::for_location(path.to_str().unwrap())
    }

    fn put(config: &StoreConfig, name: &str, value: &str) -> String {
        let mut out = Vec::new();
        let args = PutArgs {
            name: name.into(),
            value: Some(value.into()),
            file: None,
        };
        cmd_put(&mut out, config, args, OutputFormat::Text).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn get(config: &StoreConfig, name: &str, format: OutputFormat) -> anyhow::Result<String> {
        let mut out = Vec::new();
        cmd_get(&mut out, config, GetArgs { name: name.into() }, format)?;
        Ok(String::from_utf8(out).unwrap())
    }

    // -----------------------------------------------------------------------
    // put / get / rm
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path());

        let text = put(&config, "a", r#"{"x": 1}"#);
        assert!(text.contains("Saved a"));
        assert!(dir.path().join("a.json").exists());

        let shown = get(&config, "a", OutputFormat::Text).unwrap();
        let value: Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(value, json!({"x": 1}));

        put(&config, "a", r#"{"x": 2}"#);
        let shown = get(&config, "a", OutputFormat::Text).unwrap();
        assert!(shown.contains("\"x\": 2"));
    }

    #[test]
    fn put_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path());
        let args = PutArgs {
            name: "a".into(),
            value: Some("{nope".into()),
            file: None,
        };
        assert!(cmd_put(&mut Vec::new(), &config, args, OutputFormat::Text).is_err());
        assert!(!dir.path().join("a.json").exists());
    }

    #[test]
    fn put_file_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let config = config_at(&store_dir);
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"plain words").unwrap();

        let args = PutArgs {
            name: name_from_path(&source),
            value: None,
            file: Some(source),
        };
        cmd_put(&mut Vec::new(), &config, args, OutputFormat::Text).unwrap();
        assert!(store_dir.join("notes.txt").exists());

        assert_eq!(get(&config, "notes", OutputFormat::Text).unwrap(), "plain words");
        let summary: Value =
            serde_json::from_str(&get(&config, "notes", OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(summary["size"], 11);
        assert_eq!(summary["content_type"], "text/plain; charset=utf-8");
    }

    #[test]
    fn rm_removes_and_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path());
        put(&config, "a", "1");

        let mut out = Vec::new();
        cmd_rm(&mut out, &config, RmArgs { name: "a".into() }, OutputFormat::Json).unwrap();
        let removed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(removed["removed"], "a");
        assert!(!dir.path().join("a.json").exists());

        let err = cmd_rm(&mut Vec::new(), &config, RmArgs { name: "a".into() }, OutputFormat::Text)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(get(&config, "a", OutputFormat::Text).is_err());
    }

    // -----------------------------------------------------------------------
    // ls / info
    // -----------------------------------------------------------------------

    #[test]
    fn ls_describes_each_store() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let config = config_at(&first);
        put(&config, "idx1", "{}");
        put(&config, "index2", "{}");

        let args = LsArgs {
            locations: vec![
                first.to_str().unwrap().into(),
                second.to_str().unwrap().into(),
            ],
            details: true,
        };
        let mut out = Vec::new();
        cmd_ls(&mut out, &config, args, OutputFormat::Text).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("store \"first\""));
        assert!(lines[0].ends_with("objects 2"));
        assert_eq!(lines[1], "\tidx1");
        assert_eq!(lines[2], "\tindex2");
        assert!(lines[3].starts_with("store \"second\""));
        assert!(second.is_dir());
    }

    #[test]
    fn ls_json_defaults_to_configured_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path());
        put(&config, "a", "{}");

        let args = LsArgs {
            locations: Vec::new(),
            details: false,
        };
        let mut out = Vec::new();
        cmd_ls(&mut out, &config, args, OutputFormat::Json).unwrap();
        let listed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(listed[0]["objects"], 1);
        assert!(listed[0].get("names").is_none());
    }

    #[test]
    fn info_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(dir.path());
        put(&config, "a", r#"{"k": "v"}"#);

        let mut out = Vec::new();
        cmd_info(&mut out, &config, OutputFormat::Json).unwrap();
        let info: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(info["backend"], "local");
        assert_eq!(info["objects"], 1);
        assert!(info["bytes"].as_u64().unwrap() > 0);
        assert_eq!(info["stats"]["indexed"], 1);
    }

    #[test]
    fn store_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stash.toml");
        fs::write(&file, "location = \"/from/file\"\nextension = \"json\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "stash",
            "info",
            "--config",
            file.to_str().unwrap(),
            "--store",
            "/from/flag",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.location, "/from/flag");

        let cli = Cli::try_parse_from(["stash", "info", "--config", file.to_str().unwrap()]).unwrap();
        assert_eq!(load_config(&cli).unwrap().location, "/from/file");
    }
}
