use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use strata_diff::{diff_indices, resolve_revisions};
use strata_index::{read_blob, to_dot, write_blob, DigestIndex, Indices, NameIndex, WriteIndex};
use strata_store::{Database, IndexKind, StoreConfig};
use strata_types::{RevisionNumber, HEAD_REVISION};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(args, config),
        Command::Write(args) => cmd_write(args, config, format),
        Command::Read(args) => cmd_read(args, config),
        Command::List(args) => cmd_list(args, config, format),
        Command::Diff(args) => cmd_diff(args, config, format),
        Command::Structure(args) => cmd_structure(args, config),
        Command::Log(args) => cmd_log(args, config, format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let Some(path) = path else {
        return Ok(StoreConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(StoreConfig::from_toml_str(&text)?)
}

fn open_read_only(path: &Path, config: StoreConfig) -> anyhow::Result<Database> {
    let config = StoreConfig {
        read_only: true,
        ..config
    };
    Database::open_path(path, config).with_context(|| format!("opening {}", path.display()))
}

fn open_writable(path: &Path, config: StoreConfig) -> anyhow::Result<Database> {
    Database::open_path(path, config).with_context(|| format!("opening {}", path.display()))
}

/// Split a `KEY=VALUE` argument.
fn parse_assignment(arg: &str) -> anyhow::Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("expected KEY=VALUE, got {arg:?}"),
    }
}

/// Parse a 128-bit digest written as up to 32 hex digits.
fn parse_digest(text: &str) -> anyhow::Result<u128> {
    let text = text.strip_prefix("0x").unwrap_or(text);
    if text.is_empty() || text.len() > 32 {
        bail!("digest must be 1 to 32 hex digits, got {text:?}");
    }
    let padded = format!("{text:0>32}");
    let bytes = hex::decode(&padded).with_context(|| format!("invalid digest {text:?}"))?;
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes);
    Ok(u128::from_be_bytes(buf))
}

fn revision_arg(revision: Option<u32>) -> RevisionNumber {
    revision.unwrap_or(HEAD_REVISION)
}

fn cmd_init(args: InitArgs, config: StoreConfig) -> anyhow::Result<()> {
    if args.db.exists() {
        bail!("{} already exists", args.db.display());
    }
    let db = open_writable(&args.db, config)?;
    println!(
        "{} Initialized empty store in {} (revision {})",
        "✓".green().bold(),
        args.db.display().to_string().bold(),
        db.current_revision()
    );
    Ok(())
}

fn cmd_write(args: WriteArgs, config: StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_writable(&args.db, config)?;
    let mut indices = Indices::open(&db, HEAD_REVISION)?;
    let mut txn = db.begin()?;
    let mut written = 0usize;

    for arg in &args.add {
        let (key, value) = parse_assignment(arg)?;
        let blob = write_blob(&mut txn, value.as_bytes())?;
        indices.write.insert_or_assign(&mut txn, &key.to_string(), &blob)?;
        written += 1;
    }
    for arg in &args.add_file {
        let (key, path) = parse_assignment(arg)?;
        let bytes = fs::read(path).with_context(|| format!("reading {path}"))?;
        let blob = write_blob(&mut txn, &bytes)?;
        indices.write.insert_or_assign(&mut txn, &key.to_string(), &blob)?;
        written += 1;
    }
    for name in &args.add_name {
        if indices.name.insert(&mut txn, name)?.1 {
            written += 1;
        }
    }
    for arg in &args.add_digest {
        let (digest, value) = parse_assignment(arg)?;
        let digest = parse_digest(digest)?;
        let blob = write_blob(&mut txn, value.as_bytes())?;
        indices.digest.insert_or_assign(&mut txn, &digest, &blob)?;
        written += 1;
    }

    indices.commit_to(&mut txn)?;
    let base = txn.base_revision();
    debug!(written, pending = txn.size(), "committing");
    let revision = txn.commit()?;
    let committed = revision != base;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "revision": revision,
                "committed": committed,
                "written": written,
                "size": db.size(),
            })
        ),
        OutputFormat::Text => println!("{}", commit_summary(committed, revision, written)),
    }
    Ok(())
}

fn commit_summary(committed: bool, revision: RevisionNumber, written: usize) -> String {
    if committed {
        format!(
            "{} Committed revision {} ({} keys written)",
            "✓".green().bold(),
            revision.to_string().yellow(),
            written
        )
    } else {
        format!("No changes; store remains at revision {revision}")
    }
}

fn cmd_read(args: ReadArgs, config: StoreConfig) -> anyhow::Result<()> {
    let db = open_read_only(&args.db, config)?;
    let revision = revision_arg(args.revision);
    let kind = IndexKind::from(args.index);
    let extent = match kind {
        IndexKind::Write => WriteIndex::open(&db, kind, revision)?.get(&db, &args.key)?,
        IndexKind::Digest => {
            let digest = parse_digest(&args.key)?;
            DigestIndex::open(&db, kind, revision)?.get(&db, &digest)?
        }
        IndexKind::Name => {
            if !NameIndex::open(&db, kind, revision)?.contains(&db, &args.key)? {
                bail!("{} is not in the name index", args.key);
            }
            println!("{}", args.key);
            return Ok(());
        }
    };
    let Some(extent) = extent else {
        bail!("{} not found in the {kind} index", args.key);
    };
    let bytes = read_blob(&db, extent)?;
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

fn cmd_list(args: ListArgs, config: StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_read_only(&args.db, config)?;
    let revision = revision_arg(args.revision);
    let kind = IndexKind::from(args.index);

    // (key, location) pairs; names have no location.
    let mut rows: Vec<(String, Option<String>)> = match kind {
        IndexKind::Write => WriteIndex::open(&db, kind, revision)?
            .entries(&db)?
            .into_iter()
            .map(|(key, extent)| (key, Some(extent.to_string())))
            .collect(),
        IndexKind::Digest => DigestIndex::open(&db, kind, revision)?
            .entries(&db)?
            .into_iter()
            .map(|(digest, extent)| (format!("{digest:032x}"), Some(extent.to_string())))
            .collect(),
        IndexKind::Name => NameIndex::open(&db, kind, revision)?
            .keys(&db)?
            .into_iter()
            .map(|name| (name, None))
            .collect(),
    };
    rows.sort();

    match format {
        OutputFormat::Json => {
            let items: Vec<_> = rows
                .iter()
                .map(|(key, at)| json!({ "key": key, "extent": at }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("The {kind} index is empty.");
            }
            for (key, at) in &rows {
                match at {
                    Some(at) => println!("{}  {}", key.bold(), at.dimmed()),
                    None => println!("{}", key.bold()),
                }
            }
        }
    }
    Ok(())
}

fn cmd_diff(args: DiffArgs, config: StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_read_only(&args.db, config)?;
    let (new, old) = resolve_revisions(args.new, args.old, db.current_revision())?;
    let diff = diff_indices(&db, new, old)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
        OutputFormat::Text => {
            println!("Changes from r{} to r{}", old.to_string().yellow(), new.to_string().yellow());
            if diff.is_empty() {
                println!("No changes.");
            }
            let sections = [
                (IndexKind::Write, &diff.write),
                (IndexKind::Digest, &diff.digest),
                (IndexKind::Name, &diff.name),
            ];
            for (kind, keys) in sections {
                if keys.is_empty() {
                    continue;
                }
                println!("{}:", kind.to_string().bold());
                let mut keys = keys.clone();
                keys.sort();
                for key in keys {
                    println!("  {} {}", "+".green(), key);
                }
            }
        }
    }
    Ok(())
}

fn cmd_structure(args: StructureArgs, config: StoreConfig) -> anyhow::Result<()> {
    let db = open_read_only(&args.db, config)?;
    let revision = revision_arg(args.revision);
    let kind = IndexKind::from(args.index);
    let dot = match kind {
        IndexKind::Write => to_dot(&db, WriteIndex::open(&db, kind, revision)?.root())?,
        IndexKind::Digest => to_dot(&db, DigestIndex::open(&db, kind, revision)?.root())?,
        IndexKind::Name => to_dot(&db, NameIndex::open(&db, kind, revision)?.root())?,
    };
    print!("{dot}");
    Ok(())
}

fn cmd_log(args: LogArgs, config: StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_read_only(&args.db, config)?;
    let mut revisions = db.revisions()?;
    if let Some(limit) = args.limit {
        revisions.truncate(limit);
    }

    match format {
        OutputFormat::Json => {
            let items: Vec<_> = revisions
                .iter()
                .map(|(pos, footer)| {
                    let indices: serde_json::Map<String, serde_json::Value> = IndexKind::ALL
                        .iter()
                        .filter_map(|&kind| {
                            footer
                                .index_root(kind)
                                .map(|addr| (kind.to_string(), json!(addr.to_string())))
                        })
                        .collect();
                    json!({
                        "revision": footer.revision,
                        "footer": pos.to_string(),
                        "size": footer.size,
                        "time_ms": footer.time_ms,
                        "indices": indices,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for (pos, footer) in &revisions {
                let when = chrono::DateTime::from_timestamp_millis(footer.time_ms as i64)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
                    .unwrap_or_else(|| "unknown time".into());
                let indices: Vec<String> = IndexKind::ALL
                    .iter()
                    .filter(|&&kind| footer.index_root(kind).is_some())
                    .map(ToString::to_string)
                    .collect();
                println!(
                    "{}  {}  {} bytes  footer {}  [{}]",
                    format!("r{}", footer.revision).yellow().bold(),
                    when.dimmed(),
                    footer.size,
                    pos,
                    indices.join(", ")
                );
            }
        }
    }
    Ok(())
}
