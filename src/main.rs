//! jar-l10n - localization bundle round-tripping for jar archives

use anyhow::Result;
use clap::{Parser, Subcommand};
use jar_l10n::pipeline;
use jar_l10n::rewrite::ResourceState;
use jar_l10n::{InitConfig, InjectMode, StoreConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jar-l10n")]
#[command(version)]
#[command(about = "Mirror Bundle.properties out of jar archives and store translated overrides back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Manifest file linking archives to their mirrors
    #[arg(long, global = true, default_value = "structure.json")]
    manifest: PathBuf,

    /// Worker threads (defaults to CPU thread count)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for archives and extract their bundles into the mirror tree
    Init {
        /// Directory scanned for jar archives
        #[arg(short, long)]
        root: PathBuf,

        /// Directory the mirror tree is created under
        #[arg(short, long)]
        output: PathBuf,

        /// Target locale; existing overrides for it are extracted too
        #[arg(short, long)]
        lang: Option<String>,

        /// Scan again even if the manifest already lists archives
        #[arg(long)]
        rescan: bool,
    },

    /// Inject locale overrides from the mirror tree back into the archives
    Store {
        /// Target locale, e.g. `es` for Bundle_es.properties (without it nothing is stored)
        #[arg(short, long)]
        lang: Option<String>,

        /// Add the override next to the base bundle instead of replacing it
        #[arg(long)]
        alongside: bool,

        /// Only report what would be rewritten
        #[arg(long)]
        dry_run: bool,
    },

    /// Show tracked bundles and the override state of each
    Status {
        /// Target locale
        #[arg(short, long)]
        lang: Option<String>,

        /// Entry names as `store --alongside` would write them
        #[arg(long)]
        alongside: bool,
    },
}

fn inject_mode(alongside: bool) -> InjectMode {
    if alongside {
        InjectMode::Alongside
    } else {
        InjectMode::Replace
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(if cli.verbose { "jar_l10n=debug".parse()? } else { "jar_l10n=info".parse()? }),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global()?;
    }

    match cli.command {
        Commands::Init {
            root,
            output,
            lang,
            rescan,
        } => {
            let mut config = InitConfig::new(root, output);
            config.lang = lang;
            config.manifest_path = cli.manifest;
            config.rescan = rescan;
            config.show_progress = !cli.no_progress;

            let report = pipeline::init(&config)?;

            if report.bypassed {
                println!(
                    "Manifest already lists {} archives; nothing scanned (use --rescan to rebuild).",
                    report.manifest.len()
                );
                return Ok(());
            }

            println!("\n=== Init Summary ===");
            println!("Archives:  {} with bundles", report.manifest.len());
            println!("Bundles:   {} extracted, {} tracked", report.extracted(), report.manifest.tracked_count());
            println!("Failures:  {}", report.failures());
            for failure in report
                .scan
                .failures
                .iter()
                .chain(&report.structure_failures)
                .chain(report.extraction.iter().flat_map(|a| a.failures.iter()))
            {
                println!("  {}", failure);
            }
            if !report.saved && !report.manifest.is_empty() {
                println!("\nManifest could not be written to {}. Check logs.", config.manifest_path.display());
            }
        }

        Commands::Store {
            lang,
            alongside,
            dry_run,
        } => {
            let mut config = StoreConfig::new(lang.as_deref());
            config.manifest_path = cli.manifest;
            config.inject_mode = inject_mode(alongside);
            config.dry_run = dry_run;
            config.show_progress = !cli.no_progress;

            let report = pipeline::store(&config)?;

            for archive in &report.archives {
                for resource in &archive.resources {
                    if resource.state != ResourceState::NoOverride {
                        println!("{}: {}", resource.resource.display(), resource.state);
                    }
                }
                if let Some(backup) = &archive.backup {
                    println!("  backup: {}", backup.display());
                }
                for failure in &archive.failures {
                    println!("  skipped entry {}", failure);
                }
            }

            println!("\n=== Store Summary ===");
            if report.dry_run {
                println!("Dry run:   {} overrides would be stored", report.pending());
            } else {
                println!("Archives:  {} rewritten", report.archives_rewritten());
                println!("Overrides: {} stored, {} aborted", report.rewritten(), report.aborted());
            }
            println!("Skipped:   {} already applied, {} without override", report.already_applied(), report.no_override());
            if report.entry_failures() > 0 {
                println!("\n{} archive entries could not be copied. Backups were kept.", report.entry_failures());
            }
        }

        Commands::Status { lang, alongside } => {
            let mut config = StoreConfig::new(lang.as_deref());
            config.manifest_path = cli.manifest;
            config.inject_mode = inject_mode(alongside);

            let (manifest, plans) = pipeline::status(&config)?;

            println!("=== Manifest ({} archives, {} tracked bundles) ===", manifest.len(), manifest.tracked_count());
            for (entry, plan) in manifest.entries.iter().zip(&plans) {
                println!("{}", entry.source_archive_path.display());
                println!("  mirror: {}", entry.output_path.display());
                for resource in &plan.resources {
                    println!("  {:>16}  {}", resource.state.label(), resource.resource.display());
                }
            }
        }
    }

    Ok(())
}
