// Thin CLI driver around the curation engines.
// Databases travel as JSON (the handoff format with the external bibtex
// parser/serializer); every operation reads one file and either writes a
// new one or prints a report.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use bibcurate::{ConsistencyAuditor, CrossrefClient, Database, Disambiguator, DoiReconciler};

#[derive(Parser)]
#[command(
    name = "bibcurate",
    version,
    about = "Curate a bibliographic index: derive keys, fill in DOIs, audit consistency"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive author-based keys and disambiguate collisions
    Keys {
        /// Database file (JSON)
        db: PathBuf,

        /// Output file (defaults to <db>.out)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fill in missing DOIs from Crossref
    Doi {
        /// Database file (JSON)
        db: PathBuf,

        /// Output file (defaults to <db>.out)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Also re-check entries that already have a DOI
        #[arg(short = 'c', long)]
        check_known: bool,

        /// Restrict to one conference/category
        #[arg(long)]
        filter: Option<String>,
    },

    /// Run consistency audits (DOI prefixes, key initials, person variants)
    Audit {
        /// Database file (JSON)
        db: PathBuf,

        /// Restrict to one conference/category
        #[arg(long)]
        filter: Option<String>,

        /// Also display successful checks
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Keys { db, out } => run_keys(&db, out),
        Command::Doi {
            db,
            out,
            check_known,
            filter,
        } => run_doi(&db, out, check_known, filter),
        Command::Audit {
            db,
            filter,
            verbose,
        } => run_audit(&db, filter, verbose),
    }
}

fn out_path(db_path: &Path, out: Option<PathBuf>) -> PathBuf {
    out.unwrap_or_else(|| {
        let mut p = db_path.as_os_str().to_owned();
        p.push(".out");
        PathBuf::from(p)
    })
}

fn run_keys(db_path: &Path, out: Option<PathBuf>) -> Result<()> {
    println!("Reading database {}...", db_path.display());
    let db = Database::load(db_path)?;
    println!("✓ Loaded {} entries", db.entries.len());

    let new_db = Disambiguator::new().rederive_keys(&db)?;

    let out = out_path(db_path, out);
    new_db.save(&out)?;
    println!("✓ Wrote {} entries to {}", new_db.entries.len(), out.display());
    Ok(())
}

fn run_doi(
    db_path: &Path,
    out: Option<PathBuf>,
    check_known: bool,
    filter: Option<String>,
) -> Result<()> {
    println!("Reading database {}...", db_path.display());
    let mut db = Database::load(db_path)?;
    println!("✓ Loaded {} entries", db.entries.len());

    let client = CrossrefClient::new()?;
    let reconciler = DoiReconciler {
        check_known,
        category_filter: filter,
        ..DoiReconciler::new()
    };
    let report = reconciler.reconcile(&mut db, &client)?;

    println!("{}", report.summary());

    let out = out_path(db_path, out);
    db.save(&out)?;
    println!("✓ Wrote {}", out.display());
    Ok(())
}

fn run_audit(db_path: &Path, filter: Option<String>, verbose: bool) -> Result<()> {
    println!("Reading database {}...", db_path.display());
    let db = Database::load(db_path)?;
    println!("✓ Loaded {} entries\n", db.entries.len());

    let auditor = ConsistencyAuditor {
        category_filter: filter,
        verbose,
        ..ConsistencyAuditor::new()
    };
    let report = auditor.audit(&db)?;

    for volume in report.doi.inconsistent() {
        println!(
            "✗ book {}: DOI prefixes disagree: {}",
            volume.book,
            volume.prefixes.join(" ")
        );
    }
    for volume in &report.doi.volumes {
        if !volume.has_full_coverage() {
            println!(
                "! book {} has only {:2} entries with DOI out of {}",
                volume.book, volume.entries_with_doi, volume.entries_total
            );
        }
    }
    println!("\n{}", report.doi.summary());
    println!("\n{}", report.key_initials.summary());

    if !report.person_variants.groups.is_empty() {
        println!();
        for (name, variants) in &report.person_variants.groups {
            println!("! {} has multiple spellings:", name);
            for v in variants {
                println!("    {v}");
            }
        }
    }

    Ok(())
}
