#![forbid(unsafe_code)]
#![allow(clippy::too_many_lines)]

//! Command-line front end over the archive core: list/extract/add entries
//! and print detected maps, without any of the GUI that normally drives it.

use clap::{Parser, Subcommand};
use slade_core::archive::{open_path, Archive, ArchiveEntry, SearchOptions};
use slade_core::config::ArchiveConfig;
use slade_core::map::io as map_io;
use slade_core::services::{TableResourceManager, UdmfTextParser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "slade-core", version, about = "SLADE archive/map core CLI", long_about = None)]
struct Cli {
    /// Path to a config TOML file (overrides SLADE_CONFIG/./slade.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every entry in an archive.
    #[command(name = "list")]
    List { archive: PathBuf },
    /// Print detected maps in an archive.
    #[command(name = "maps")]
    Maps { archive: PathBuf },
    /// Extract a single entry's bytes to stdout or a file.
    #[command(name = "extract")]
    Extract { archive: PathBuf, entry: String, #[arg(long)] out: Option<PathBuf> },
    /// Add a file to an archive and save.
    #[command(name = "add")]
    Add { archive: PathBuf, file: PathBuf, #[arg(long)] name: Option<String> },
    /// Show archive-level metadata (format, entry count, modified flag).
    #[command(name = "info")]
    Info { archive: PathBuf },
    /// Generate a VWAD signing keypair and print it (Z85 and hex).
    #[command(name = "vwad-keygen")]
    VwadKeygen,
}

fn main() {
    let _ = slade_core::init();
    let cli = Cli::parse();
    let cfg = ArchiveConfig::load(cli.config.as_deref());

    if let Err(err) = run(cli.command, &cfg) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Command, cfg: &ArchiveConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List { archive } => {
            let archive = open_path(&archive, cfg)?;
            for entry in archive.base().entry_tree_as_list() {
                println!("{:>10}  {}", entry.size(), entry.name());
            }
        }
        Command::Maps { archive } => {
            let archive = open_path(&archive, cfg)?;
            let resources = TableResourceManager::new();
            let parser = UdmfTextParser;
            for desc in archive.detect_maps() {
                match map_io::read_map(archive.as_ref(), &desc, &resources, &parser) {
                    Ok(mut map) => {
                        map.split_auto_offset = cfg.map_split_auto_offset;
                        println!(
                            "{:<16} {:<8?} vertices={:<6} lines={:<6} sides={:<6} sectors={:<6} things={}",
                            desc.name,
                            desc.format,
                            map.vertices.len(),
                            map.lines.len(),
                            map.sides.len(),
                            map.sectors.len(),
                            map.things.len()
                        );
                    }
                    Err(err) => println!("{:<16} {:<8?} <failed to read: {err}>", desc.name, desc.format),
                }
            }
        }
        Command::Extract { archive, entry, out } => {
            let archive = open_path(&archive, cfg)?;
            let opts = SearchOptions { match_name: Some(entry.clone()), search_subdirs: true, ..SearchOptions::default() };
            let found: ArchiveEntry = archive
                .base()
                .find_first(&opts)
                .ok_or_else(|| format!("no entry named '{entry}'"))?;
            let bytes = archive.load_entry_data(&found)?;
            match out {
                Some(path) => std::fs::write(path, bytes)?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        Command::Add { archive: archive_path, file, name } => {
            let archive = open_path(&archive_path, cfg)?;
            let bytes = std::fs::read(&file)?;
            let name = name.unwrap_or_else(|| {
                file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "UNNAMED".to_string())
            });
            archive.base().add_entry(None, ArchiveEntry::new(name, bytes), None)?;
            archive.save(None)?;
        }
        Command::Info { archive } => {
            let archive = open_path(&archive, cfg)?;
            println!("format:    {:?}", archive.base().format_id);
            println!("entries:   {}", archive.base().num_entries());
            println!("modified:  {}", archive.base().modified());
            println!("read_only: {}", archive.base().read_only());
            let diag = slade_core::diagnostics::report();
            println!("version:   {}", diag.crate_version);
            println!(
                "features:  {}",
                if diag.compiled_features.is_empty() { "none".to_string() } else { diag.compiled_features.join(",") }
            );
        }
        Command::VwadKeygen => {
            let private_key = slade_core::archive::vwad::generate_private_key();
            let public_key = slade_core::archive::vwad::derive_public_key(&private_key)?;
            let public_key_bytes = slade_core::archive::vwad::z85::decode(&public_key).ok_or("bad z85 key")?;
            println!("private (z85): {private_key}");
            println!("public  (z85): {public_key}");
            println!("public  (hex): {}", hex::encode(public_key_bytes));
        }
    }
    Ok(())
}
