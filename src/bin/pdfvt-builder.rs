//! PDF/VT Builder CLI tool
//!
//! A command-line tool for building per-record PDF/VT documents and
//! inspecting the result.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pdfvt_builder::config::{ComplianceConfig, DEFAULT_RECORD_ID_KEY};
use pdfvt_builder::layout::PageDimensions;
use pdfvt_builder::pdf::{extract_metadata, DocumentAssembler, TextPageRenderer};
use pdfvt_builder::record::load_records;

/// PDF/VT Builder - Assemble variable-data PDFs from records
#[derive(Parser)]
#[command(name = "pdfvt-builder")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Build a PDF/VT document, one leaf per record
    pdfvt-builder build --config compliance.json --inputs records.json -o statements.pdf

    # Render records on all cores, A4 pages
    pdfvt-builder build --config compliance.json --inputs records.json -o out.pdf --page-size a4 --parallel

    # Show the structure of a finished document
    pdfvt-builder info statements.pdf")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PageSize {
    Letter,
    A4,
}

impl PageSize {
    fn dimensions(self) -> PageDimensions {
        match self {
            PageSize::Letter => PageDimensions::letter(),
            PageSize::A4 => PageDimensions::a4(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a document from a JSON array of records
    Build {
        /// Compliance configuration (JSON). Compliance is off when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Records file: a JSON array of objects, in output order
        #[arg(long)]
        inputs: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Page size for the built-in renderer
        #[arg(long, value_enum, default_value = "letter")]
        page_size: PageSize,

        /// Only print these record fields (comma-separated)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,

        /// Render records in parallel before committing them in order
        #[arg(long)]
        parallel: bool,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,

        /// Metadata key holding the record identifier
        #[arg(long, default_value = DEFAULT_RECORD_ID_KEY)]
        record_id_key: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            config, inputs, output, page_size, fields, parallel, open,
        } => {
            cmd_build(config, inputs, output, page_size, fields, parallel, open)
        }
        Commands::Info { input, record_id_key } => {
            cmd_info(input, &record_id_key)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "pdfvt_builder=debug" } else { "pdfvt_builder=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open a file with the system default application
fn open_file(path: &PathBuf) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Render every record and write the assembled document
fn cmd_build(
    config: Option<PathBuf>,
    inputs: PathBuf,
    output: PathBuf,
    page_size: PageSize,
    fields: Option<Vec<String>>,
    parallel: bool,
    open: bool,
) -> Result<()> {
    if !inputs.exists() {
        bail!("Input file not found: {}", inputs.display());
    }

    let config = match config {
        Some(path) => ComplianceConfig::load(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ComplianceConfig::default(),
    };
    let records = load_records(&inputs)
        .with_context(|| format!("Failed to read records {}", inputs.display()))?;

    eprintln!("Building {} records...", records.len());

    let renderer = TextPageRenderer {
        page: page_size.dimensions(),
        fields,
        ..Default::default()
    };

    let mut assembler = DocumentAssembler::new(config);
    if parallel {
        assembler.build_parallel(&records, &renderer)?;
    } else {
        assembler.build(&records, &renderer)?;
    }
    let document = assembler.finish()?;
    let pages = document.page_count();
    document.save(&output)?;

    eprintln!("Output: {} ({} pages)", output.display(), pages);

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf, record_id_key: &str) -> Result<()> {
    let metadata = extract_metadata(&input, record_id_key)?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);
    println!("Records: {}", metadata.record_count);
    println!("Records with metadata: {}", metadata.records_with_metadata);
    println!("Output intent: {}", if metadata.has_output_intent { "yes" } else { "no" });
    println!("PDF/VT XMP: {}", if metadata.has_pdfvt_xmp { "yes" } else { "no" });

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(producer) = metadata.producer {
        println!("Producer: {}", producer);
    }
    for (i, id) in metadata.record_ids.iter().enumerate() {
        println!("  [{}] {}", i, id.as_deref().unwrap_or("-"));
    }

    Ok(())
}
