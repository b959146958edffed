//! Kovcheg CLI - Command-line tool for ZIP archives and self-extractors.
//!
//! This is the main entry point for the Kovcheg command-line application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use kovcheg::prelude::*;
use kovcheg::zip::{ExtractReport, FileVolumes, FixedDecisions, ProgressSink, VolumeProvider};

/// Kovcheg - ZIP archive inspection, extraction and rewrite tool
#[derive(Parser)]
#[command(name = "kovcheg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    List {
        /// Path to the archive
        #[arg(short, long, env = "INPUT_ARCHIVE")]
        archive: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Extract files from an archive
    Extract {
        /// Path to the archive
        #[arg(short, long, env = "INPUT_ARCHIVE")]
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Password for encrypted entries
        #[arg(short, long, env = "ARCHIVE_PASSWORD")]
        password: Option<String>,

        /// Replace existing files without asking
        #[arg(long)]
        overwrite: bool,

        /// Stop on the first corrupt entry instead of reporting and
        /// continuing
        #[arg(long)]
        fail_fast: bool,
    },

    /// Delete entries from an archive, rewriting it without
    /// re-compression
    Delete {
        /// Path to the archive
        #[arg(short, long, env = "INPUT_ARCHIVE")]
        archive: PathBuf,

        /// Entry names to remove (case-insensitive)
        #[arg(required = true)]
        names: Vec<String>,

        /// Rewrite in place instead of through a temporary backup file
        #[arg(long)]
        in_place: bool,

        /// Keep a zero-length directory entry when the name root empties
        #[arg(long)]
        keep_root: bool,
    },

    /// Build a self-extractor from a stub executable and an archive
    SfxBuild {
        /// Host executable stub
        #[arg(short, long)]
        stub: PathBuf,

        /// Archive payload
        #[arg(short, long)]
        archive: PathBuf,

        /// Output image
        #[arg(short, long)]
        output: PathBuf,

        /// Extractor window title
        #[arg(long, default_value = "")]
        title: String,

        /// Command to run after extraction
        #[arg(long, default_value = "")]
        command: String,

        /// Target directory offered by the extractor
        #[arg(long, default_value = "")]
        target_dir: String,

        /// Vendor name
        #[arg(long, default_value = "")]
        vendor: String,

        /// Mark the stub as multi-volume capable
        #[arg(long)]
        multi_volume: bool,
    },

    /// Show the metadata block of a self-extractor
    SfxInfo {
        /// Self-extractor image
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List {
            archive,
            filter,
            detailed,
        } => cmd_list(&archive, filter.as_deref(), detailed)?,
        Commands::Extract {
            archive,
            output,
            password,
            overwrite,
            fail_fast,
        } => cmd_extract(&archive, &output, password, overwrite, fail_fast)?,
        Commands::Delete {
            archive,
            names,
            in_place,
            keep_root,
        } => cmd_delete(&archive, &names, in_place, keep_root)?,
        Commands::SfxBuild {
            stub,
            archive,
            output,
            title,
            command,
            target_dir,
            vendor,
            multi_volume,
        } => cmd_sfx_build(
            &stub,
            &archive,
            &output,
            SfxFields {
                title,
                command,
                target_dir,
                vendor,
            },
            multi_volume,
        )?,
        Commands::SfxInfo { input } => cmd_sfx_info(&input)?,
    }

    Ok(())
}

fn cmd_list(path: &Path, filter: Option<&str>, detailed: bool) -> Result<()> {
    let archive = ZipArchive::open(path).context("Failed to open archive")?;

    if archive.is_spanned() {
        println!("(multi-volume archive, final volume)");
    }

    let mut count = 0;
    for entry in archive.entries() {
        if let Some(pattern) = filter {
            if !glob_match(pattern, entry.name()) {
                continue;
            }
        }

        if detailed {
            println!(
                "{:>12} {:>12} {}{} {}",
                entry.compressed_size(),
                entry.uncompressed_size(),
                if entry.is_encrypted() { "E" } else { " " },
                match entry.method() {
                    CompressionMethod::Store => "S",
                    CompressionMethod::Deflate => "D",
                },
                entry.name()
            );
        } else {
            println!("{}", entry.name());
        }
        count += 1;
    }

    println!("\nTotal: {} entries", count);
    Ok(())
}

/// Renders engine progress on an indicatif byte bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(bytes_total: u64) -> Result<Self> {
        let bar = ProgressBar::new(bytes_total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressSink for BarProgress {
    fn report_progress(&mut self, bytes_done: u64, _bytes_total: u64) {
        self.bar.set_position(bytes_done);
    }
}

fn cmd_extract(
    path: &Path,
    output: &Path,
    password: Option<String>,
    overwrite: bool,
    fail_fast: bool,
) -> Result<()> {
    println!("Opening archive: {}", path.display());

    let start = Instant::now();
    let archive = ZipArchive::open(path).context("Failed to open archive")?;
    println!(
        "Loaded {} entries in {:?}",
        archive.entry_count(),
        start.elapsed()
    );

    fs::create_dir_all(output)?;

    let bytes_total: u64 = archive
        .entries()
        .iter()
        .map(|e| u64::from(e.uncompressed_size()))
        .sum();
    let mut progress = BarProgress::new(bytes_total)?;
    let mut decisions = FixedDecisions {
        password: password.map(String::into_bytes),
        overwrite,
    };
    let options = ExtractOptions {
        continue_on_error: !fail_fast,
    };

    // Earlier volumes of a spanned set are opened from sibling files
    // next to the final volume.
    let mut volumes = FileVolumes::new(path);
    let provider: Option<&mut dyn VolumeProvider> = if archive.is_spanned() {
        Some(&mut volumes)
    } else {
        None
    };

    let start = Instant::now();
    let report = extract_all(
        &archive,
        output,
        &mut decisions,
        &mut progress,
        provider,
        &options,
        &CancelFlag::new(),
    )
    .context("Extraction failed")?;
    progress.bar.finish_with_message("Done");

    print_report(&report);
    println!("Extraction completed in {:?}", start.elapsed());
    Ok(())
}

fn print_report(report: &ExtractReport) {
    println!(
        "Extracted {} entries ({} skipped)",
        report.extracted, report.skipped
    );
    for (name, reason) in &report.failed {
        eprintln!("  corrupt: {} ({})", name, reason);
    }
}

fn cmd_delete(path: &Path, names: &[String], in_place: bool, keep_root: bool) -> Result<()> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let options = DeleteOptions {
        use_backup: !in_place,
        preserve_empty_root: keep_root,
    };

    let start = Instant::now();
    let report = delete_entries(path, &names, &options, &CancelFlag::new())
        .context("Failed to rewrite archive")?;

    for name in &report.deleted {
        println!("deleted: {}", name);
    }
    for name in &report.unmatched {
        eprintln!("no such entry: {}", name);
    }
    println!(
        "Removed {} of {} requested entries in {:?}",
        report.deleted.len(),
        names.len(),
        start.elapsed()
    );
    Ok(())
}

struct SfxFields {
    title: String,
    command: String,
    target_dir: String,
    vendor: String,
}

fn cmd_sfx_build(
    stub_path: &Path,
    archive_path: &Path,
    output: &Path,
    fields: SfxFields,
    multi_volume: bool,
) -> Result<()> {
    let stub = fs::read(stub_path).context("Failed to read stub executable")?;
    let archive = fs::read(archive_path).context("Failed to read archive")?;

    let header = SfxHeader {
        title: fields.title,
        command_line: fields.command,
        target_dir: TargetDir::Path(fields.target_dir),
        vendor: fields.vendor,
        ..SfxHeader::default()
    };

    let image = SfxBuilder::new(header)
        .multi_volume(multi_volume)
        .build(&stub, &archive)
        .context("Failed to assemble self-extractor")?;

    fs::write(output, &image).context("Failed to write output image")?;
    println!(
        "Wrote {} ({} bytes: {} stub + header + {} archive)",
        output.display(),
        image.len(),
        stub.len(),
        archive.len()
    );
    Ok(())
}

fn cmd_sfx_info(input: &Path) -> Result<()> {
    let image = fs::read(input).context("Failed to read input file")?;
    let (header, payload) =
        kovcheg::sfx::read_image(&image).context("Not a readable self-extractor")?;

    println!("title:        {}", header.title);
    println!("vendor:       {}", header.vendor);
    println!("url:          {}", header.url);
    println!("command:      {}", header.command_line);
    match &header.target_dir {
        TargetDir::Path(path) => println!("target:       {}", path),
        TargetDir::Registry { root, subkey, value } => {
            println!("target:       registry {:#010x} {}\\{}", root, subkey, value)
        }
    }
    println!("multi-volume: {}", header.supports_multi_volume());
    println!("archive:      {} bytes", header.archive_size);

    // Validate the payload's directory like the extractor half would.
    match kovcheg::zip::read_directory(payload, header.supports_multi_volume()) {
        Ok(directory) => println!("entries:      {}", directory.entries.len()),
        Err(err) => eprintln!("payload directory unreadable: {}", err),
    }
    Ok(())
}

fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern_lower = pattern.to_lowercase();
    let name_lower = name.to_lowercase();

    if pattern_lower.contains('*') {
        let parts: Vec<&str> = pattern_lower.split('*').collect();
        let mut pos = 0;

        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }

            if let Some(found) = name_lower[pos..].find(part) {
                if i == 0 && found != 0 {
                    // First part must match at start if no leading *
                    return false;
                }
                pos += found + part.len();
            } else {
                return false;
            }
        }

        // A trailing * accepts any remainder; otherwise the whole name
        // must be consumed.
        parts.last().map_or(true, |p| p.is_empty()) || pos == name_lower.len()
    } else {
        name_lower.contains(&pattern_lower)
    }
}
