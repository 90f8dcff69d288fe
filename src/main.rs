use clap::{Parser, Subcommand};
use fsarc::format::{compress, encrypt};
use fsarc::reader::{ArchiveReader, ReaderOptions};
use fsarc::recovery::scan_archive;
use fsarc::resolve_volume_path;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fsarc", version, about = "Inspect and verify .fsa filesystem archives")]
struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Give up a resynchronization after skipping this many MiB (0 = no limit)
    #[arg(long, global = true, default_value = "256", value_parser = parse_mib)]
    max_resync: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show volume and main header identity
    Info {
        archive: PathBuf,
    },
    /// Read every block of every volume and rate the archive's health
    Scan {
        archive: PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Accept payloads without comparing their checksum
        #[arg(long)]
        no_verify: bool,
    },
    /// Print the file name of a volume
    Path {
        archive: PathBuf,
        volume:  u32,
    },
}

/// MiB count to bytes.
fn parse_mib(s: &str) -> Result<u64, String> {
    let mib: u64 = s.parse().map_err(|e| format!("{e}"))?;
    mib.checked_mul(1024 * 1024)
        .ok_or_else(|| format!("{mib} MiB does not fit in a 64-bit byte count"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = ReaderOptions {
        max_resync_distance: (cli.max_resync > 0).then_some(cli.max_resync),
        ..Default::default()
    };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { archive } => {
            let mut reader = ArchiveReader::open(&archive, options)?;
            let main = reader.read_main_header()?;

            println!("── .fsa Archive ─────────────────────────────────────────");
            println!("  Path           {}", archive.display());
            println!("  Archive id     {:08x}", reader.archive_id());
            println!("  File format    {}", reader.file_format().unwrap_or("?"));
            println!("  Created with   {}", reader.creator_version().unwrap_or("?"));
            if let Some(label) = &main.label {
                println!("  Label          {}", label);
            }
            if let Some(t) = main.created_at() {
                println!("  Created        {}", t.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if let Some(n) = main.filesystem_count {
                println!("  Filesystems    {}", n);
            }
            match main.compression_level {
                Some(level) => println!(
                    "  Compression    {} (level {})",
                    compress::name(main.compression_algorithm),
                    level
                ),
                None => println!("  Compression    {}", compress::name(main.compression_algorithm)),
            }
            println!("  Encryption     {}", encrypt::name(main.encryption_algorithm));
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { archive, json, no_verify } => {
            let options = ReaderOptions { verify_checksums: !no_verify, ..options };
            let report = scan_archive(&archive, options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
                for region in &report.stats.corrupt_regions {
                    println!(
                        "  corrupt  volume={} position={} length={}",
                        region.volume, region.position, region.length
                    );
                }
                if let Some(reason) = &report.stopped_by {
                    println!("  stopped: {}", reason);
                }
            }
        }

        // ── Path ─────────────────────────────────────────────────────────────
        Commands::Path { archive, volume } => {
            println!("{}", resolve_volume_path(&archive, volume)?.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_resync_is_given_in_mib() {
        let cli = Cli::try_parse_from(["fsarc", "--max-resync", "3", "path", "a.fsa", "1"]).unwrap();
        assert_eq!(cli.max_resync, 3 * 1024 * 1024);
        let cli = Cli::try_parse_from(["fsarc", "path", "a.fsa", "1"]).unwrap();
        assert_eq!(cli.max_resync, 256 * 1024 * 1024);
    }

    #[test]
    fn oversized_max_resync_is_rejected() {
        assert_eq!(parse_mib("0"), Ok(0));
        assert!(parse_mib("17592186044416").is_err());
        assert!(parse_mib("-1").is_err());
        assert!(Cli::try_parse_from(["fsarc", "--max-resync", "18446744073709551615", "path", "a.fsa", "1"]).is_err());
    }
}
