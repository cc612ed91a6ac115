//! Command line front end for the ring document pipeline.

mod autofill;
mod compress;
mod docx;
mod error;
mod group;
mod helpers;
mod history;
mod pipeline;
mod scope;
mod sheet;

use crate::autofill::Nearest;
use crate::history::{History, HistoryEntry};
use crate::scope::Registry;
use crate::sheet::writer::write_table;
use crate::sheet::xlsx::Workbook;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ringdoc")]
#[command(author, version, about = "Generate per-ring Word documents from spreadsheet reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one document per ring group and zip the results
    Generate {
        /// Source workbook (.xlsx)
        #[arg(long)]
        excel: String,

        /// Scope key from the configuration file
        #[arg(long)]
        scope: String,

        /// Configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,

        /// Output folder (default: the configured output folder)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Topology image for one ring, as RING=PATH (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// History file the run is recorded in
        #[arg(long, default_value = "history.json")]
        history: PathBuf,
    },

    /// List configured scope keys
    Scopes {
        /// Configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },

    /// List available template files
    Templates {
        /// Configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },

    /// List the ring groups a workbook would produce
    Rings {
        /// Source workbook (.xlsx)
        #[arg(long)]
        excel: String,

        /// Scope key from the configuration file
        #[arg(long)]
        scope: String,

        /// Configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Fill empty hostname cells from a Site ID reference sheet
    AutofillHostname {
        /// Reference workbook holding Site ID and NE Name columns
        #[arg(long)]
        reference: String,

        /// Sheet inside the reference workbook
        #[arg(long, default_value = "Sheet2")]
        reference_sheet: String,

        /// Report workbook to fill
        #[arg(long)]
        excel: String,

        /// Sheet inside the report workbook
        #[arg(long)]
        sheet: String,

        /// Where the filled copy is written
        #[arg(long)]
        out: PathBuf,
    },

    /// Fill empty ring cells from an NE Name reference sheet
    AutofillRing {
        /// Reference workbook holding NE Name and Subnet columns
        #[arg(long)]
        reference: String,

        /// Sheet inside the reference workbook
        #[arg(long, default_value = "Sheet2")]
        reference_sheet: String,

        /// Report workbook to fill
        #[arg(long)]
        excel: String,

        /// Sheet inside the report workbook
        #[arg(long)]
        sheet: String,

        /// Where the filled copy is written
        #[arg(long)]
        out: PathBuf,
    },

    /// Fill empty C/AG cells with the nearest aggregation node per topology
    AutofillCag {
        /// Topology workbook holding comma-separated node chains
        #[arg(long)]
        topology: String,

        /// Sheet inside the topology workbook
        #[arg(long, default_value = "topo")]
        topology_sheet: String,

        /// Report workbook to fill
        #[arg(long)]
        excel: String,

        /// Sheet inside the report workbook
        #[arg(long)]
        sheet: String,

        /// Where the filled copy is written
        #[arg(long)]
        out: PathBuf,
    },

    /// Find the nearest aggregation node for one or more hostnames
    Nearest {
        /// Topology workbook holding comma-separated node chains
        #[arg(long)]
        topology: String,

        /// Sheet inside the topology workbook
        #[arg(long, default_value = "topo")]
        sheet: String,

        /// Hostnames to resolve
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// Show recent pipeline runs
    History {
        /// History file
        #[arg(long, default_value = "history.json")]
        file: PathBuf,

        /// How many entries to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            excel,
            scope,
            config,
            out,
            images,
            history,
        } => generate(&excel, &scope, &config, out, &images, &history),
        Commands::Scopes { config } => list_scopes(&config),
        Commands::Templates { config } => list_template_files(&config),
        Commands::Rings { excel, scope, config } => list_ring_keys(&excel, &scope, &config),
        Commands::AutofillHostname {
            reference,
            reference_sheet,
            excel,
            sheet,
            out,
        } => autofill_hostname(&reference, &reference_sheet, &excel, &sheet, &out),
        Commands::AutofillRing {
            reference,
            reference_sheet,
            excel,
            sheet,
            out,
        } => autofill_ring(&reference, &reference_sheet, &excel, &sheet, &out),
        Commands::AutofillCag {
            topology,
            topology_sheet,
            excel,
            sheet,
            out,
        } => autofill_cag(&topology, &topology_sheet, &excel, &sheet, &out),
        Commands::Nearest { topology, sheet, hosts } => nearest(&topology, &sheet, &hosts),
        Commands::History { file, limit } => show_history(&file, limit),
    }
}

fn generate(
    excel: &str,
    scope_key: &str,
    config: &Path,
    out: Option<PathBuf>,
    images: &[String],
    history: &Path,
) -> Result<()> {
    let registry = Registry::load(config)?;
    let scope = registry.scope(scope_key)?;
    let images = parse_images(images)?;
    let output_root = out.unwrap_or_else(|| PathBuf::from(&registry.settings.output_folder));
    let excel_name = Path::new(excel).file_name().and_then(OsStr::to_str).unwrap_or(excel);

    match pipeline::generate(excel, scope_key, scope, &images, &registry.settings, &output_root) {
        Ok(outcome) => {
            let zip_name = outcome.zip_path.file_name().and_then(OsStr::to_str).unwrap_or("");
            history::append(
                history,
                HistoryEntry::new(scope_key, excel_name, outcome.files.len(), zip_name, "success"),
            )?;
            println!("Run folder: {}", outcome.output_dir.display());
            println!("Archive: {}", outcome.zip_path.display());
            println!("Documents: {}", outcome.files.len());
            for warning in &outcome.warnings {
                println!("Warning: {}", warning);
            }
            Ok(())
        }
        Err(error) => {
            if let Err(history_error) =
                history::append(history, HistoryEntry::new(scope_key, excel_name, 0, "", "error"))
            {
                log::warn!("Cannot record history: {}", history_error);
            }
            Err(error.into())
        }
    }
}

/// Parses repeated `RING=PATH` pairs into the per-ring image map.
fn parse_images(pairs: &[String]) -> Result<HashMap<String, PathBuf>> {
    let mut images = HashMap::new();
    for pair in pairs {
        let Some((ring, path)) = pair.split_once('=') else {
            anyhow::bail!("invalid --image '{pair}' (expected format: RING=PATH)");
        };
        images.insert(ring.trim().to_owned(), PathBuf::from(path.trim()));
    }
    Ok(images)
}

fn list_scopes(config: &Path) -> Result<()> {
    let registry = Registry::load(config)?;
    if registry.scopes.is_empty() {
        println!("No scopes configured in {}", config.display());
        return Ok(());
    }
    for (key, scope) in &registry.scopes {
        println!("{}\t{} (sheet '{}')", key, scope.template_file, scope.excel_sheet);
    }
    Ok(())
}

fn list_template_files(config: &Path) -> Result<()> {
    let registry = Registry::load(config)?;
    let folder = PathBuf::from(&registry.settings.templates_folder);
    let names = scope::list_templates(&folder)?;
    if names.is_empty() {
        println!("No templates in {}", folder.display());
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn list_ring_keys(excel: &str, scope_key: &str, config: &Path) -> Result<()> {
    let registry = Registry::load(config)?;
    let scope = registry.scope(scope_key)?;
    for ring in pipeline::list_rings(excel, scope)? {
        println!("{}", ring);
    }
    Ok(())
}

fn autofill_hostname(reference: &str, reference_sheet: &str, excel: &str, sheet: &str, out: &Path) -> Result<()> {
    let mut reference_book = Workbook::open(reference)?;
    let reference_table = reference_book.read_table(reference_sheet)?;
    let site_col = autofill::require_column(&reference_table, "Site ID", autofill::SITE_ID_ALIASES)?;
    let ne_col = autofill::require_column(&reference_table, "NE Name", autofill::NE_NAME_ALIASES)?;
    let lookup = autofill::build_lookup(&reference_table, site_col, ne_col);

    let mut report_book = Workbook::open(excel)?;
    let mut report = report_book.read_table(sheet)?;
    let key_col = autofill::require_column(&report, "Site ID", autofill::SITE_ID_ALIASES)?;
    let target_col = autofill::require_column(&report, "Hostname", autofill::HOSTNAME_ALIASES)?;
    let outcome = autofill::fill_column(&mut report, key_col, target_col, &lookup);

    write_table(out, &report)?;
    println!("Filled {} row(s) into {}", outcome.filled, out.display());
    report_misses(&outcome.not_found);
    Ok(())
}

fn autofill_ring(reference: &str, reference_sheet: &str, excel: &str, sheet: &str, out: &Path) -> Result<()> {
    let mut reference_book = Workbook::open(reference)?;
    let reference_table = reference_book.read_table(reference_sheet)?;
    let ne_col = autofill::require_column(&reference_table, "NE Name", autofill::NE_NAME_ALIASES)?;
    let subnet_col = autofill::require_column(&reference_table, "Subnet", autofill::SUBNET_ALIASES)?;
    let lookup = autofill::build_lookup(&reference_table, ne_col, subnet_col);

    let mut report_book = Workbook::open(excel)?;
    let mut report = report_book.read_table(sheet)?;
    let key_col = autofill::require_column(&report, "Hostname", autofill::HOSTNAME_ALIASES)?;
    let target_col = autofill::require_column(&report, "Ring", autofill::RING_ALIASES)?;
    let outcome = autofill::fill_column(&mut report, key_col, target_col, &lookup);

    write_table(out, &report)?;
    println!("Filled {} row(s) into {}", outcome.filled, out.display());
    report_misses(&outcome.not_found);
    Ok(())
}

fn autofill_cag(topology: &str, topology_sheet: &str, excel: &str, sheet: &str, out: &Path) -> Result<()> {
    let chains = load_chains(topology, topology_sheet)?;

    let mut report_book = Workbook::open(excel)?;
    let mut report = report_book.read_table(sheet)?;
    let key_col = autofill::require_column(&report, "PAG Hostname", autofill::PAG_ALIASES)?;
    let target_col = autofill::require_column(&report, "C/AG Hostname", autofill::CAG_ALIASES)?;
    let filled = autofill::fill_nearest(&mut report, key_col, target_col, &chains);

    write_table(out, &report)?;
    println!("Filled {} row(s) into {}", filled, out.display());
    Ok(())
}

fn nearest(topology: &str, sheet: &str, hosts: &[String]) -> Result<()> {
    let chains = load_chains(topology, sheet)?;
    for host in hosts {
        match autofill::find_nearest_cag(&chains, host) {
            Nearest::Found(node) => println!("{}\t{}", host, node),
            Nearest::NoCandidate => println!("{}\t(no C/AG node in its chains)", host),
            Nearest::NotInChains => println!("{}\t(not found in any chain)", host),
        }
    }
    Ok(())
}

fn load_chains(topology: &str, sheet: &str) -> Result<Vec<Vec<String>>> {
    let mut workbook = Workbook::open(topology)?;
    let grid = workbook.read_grid(sheet)?;
    Ok(autofill::topology_chains(&grid))
}

fn show_history(file: &Path, limit: usize) -> Result<()> {
    let history = History::load(file)?;
    if history.history.is_empty() {
        println!("No runs recorded in {}", file.display());
        return Ok(());
    }
    for entry in history.history.iter().take(limit) {
        println!(
            "{}  {}  {}  {}  {} doc(s)  {}  {}",
            entry.id, entry.timestamp, entry.scope, entry.excel_file, entry.doc_count, entry.zip_file, entry.status
        );
    }
    Ok(())
}

fn report_misses(not_found: &[String]) {
    if !not_found.is_empty() {
        println!("Not found ({}): {}", not_found.len(), not_found.join(", "));
    }
}
