//! kiskip CLI - inspect, query and re-write KiCad S-expression files.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use kiskip::collection::spatial;
use kiskip::{Document, NodeId, Point, Schematic, WriteOptions};
use std::path::{Path, PathBuf};
use std::process;
use tracing::Level;

#[derive(Parser)]
#[command(name = "kiskip")]
#[command(about = "Inspect, query and re-write KiCad schematic and PCB files", long_about = None)]
#[command(version)]
struct Cli {
    /// Log parser and editor activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the top-level structure of a file
    Summary {
        /// Path to a .kicad_sch, .kicad_pcb or any S-expression file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List the symbols of a schematic
    Symbols {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only references starting with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Only references matching this pattern (anchored at the start)
        #[arg(long, conflicts_with = "prefix")]
        matching: Option<String>,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Find top-level elements by position
    Query {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Circle as X,Y,RADIUS
        #[arg(long, value_name = "X,Y,R", conflicts_with = "rect")]
        circle: Option<String>,

        /// Rectangle as X1,Y1,X2,Y2
        #[arg(long, value_name = "X1,Y1,X2,Y2")]
        rect: Option<String>,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Show the wires and labels attached to a symbol pin
    Net {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Symbol reference, e.g. R1
        reference: String,

        /// Pin name, or number for unnamed pins
        pin: String,
    },

    /// Parse a file and write it back out
    Rewrite {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output path (defaults to overwriting FILE)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Write everything on one line
        #[arg(long)]
        compact: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Summary { file, format } => handle_summary(&file, format),
        Commands::Symbols {
            file,
            prefix,
            matching,
            format,
        } => handle_symbols(&file, prefix, matching, format),
        Commands::Query {
            file,
            circle,
            rect,
            format,
        } => handle_query(&file, circle, rect, format),
        Commands::Net {
            file,
            reference,
            pin,
        } => handle_net(&file, &reference, &pin),
        Commands::Rewrite {
            file,
            output,
            compact,
        } => handle_rewrite(&file, output, compact),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load(file: &Path) -> anyhow::Result<Document> {
    kiskip::load(file).with_context(|| format!("failed to load {}", file.display()))
}

fn handle_summary(file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let doc = load(file)?;
    let root = doc.root();
    let counts: Vec<(String, usize)> = doc
        .node(root)
        .attributes()
        .map(|ty| (ty.to_string(), doc.children_of_type(root, ty).len()))
        .collect();

    match format {
        OutputFormat::Human => {
            println!("\nFile: {}", file.display());
            println!("{}", "─".repeat(60));
            println!("  Root:  {}", doc.entity_type(root).unwrap_or("<untyped>"));
            println!("  Nodes: {}", doc.len());
            println!("\n  Entities:");
            for (ty, count) in &counts {
                let shape = if doc.collection_of(root, ty).is_ok() {
                    " (collection)"
                } else {
                    ""
                };
                println!("    {:<20} {}{}", ty, count, shape);
            }
            if !doc.skipped().is_empty() {
                println!("\n  Skipped entries:");
                for entry in doc.skipped() {
                    println!("    - #{}: {}", entry.index, entry.message);
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": file.display().to_string(),
                "root": doc.entity_type(root),
                "nodes": doc.len(),
                "entities": counts
                    .iter()
                    .map(|(ty, n)| serde_json::json!({ "type": ty, "count": n }))
                    .collect::<Vec<_>>(),
                "skipped": doc.skipped(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn handle_symbols(
    file: &Path,
    prefix: Option<String>,
    matching: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let sch = Schematic::load(file).with_context(|| format!("failed to load {}", file.display()))?;
    let ids: Vec<NodeId> = match (prefix, matching) {
        (Some(p), _) => sch.reference_startswith(&p),
        (None, Some(m)) => sch.reference_matches(&m)?,
        (None, None) => sch.symbol_refs().iter().map(|s| s.id()).collect(),
    };

    let rows: Vec<serde_json::Value> = sch
        .symbol_refs()
        .into_iter()
        .filter(|sym| ids.contains(&sym.id()))
        .map(|sym| {
            serde_json::json!({
                "reference": sym.reference(),
                "value": sym.value(),
                "lib_id": sym.lib_id(),
                "position": sym.position(),
            })
        })
        .collect();

    match format {
        OutputFormat::Human => {
            for row in &rows {
                println!(
                    "{:<10} {:<16} {:<24} {}",
                    row["reference"].as_str().unwrap_or("?"),
                    row["value"].as_str().unwrap_or(""),
                    row["lib_id"].as_str().unwrap_or(""),
                    format_position(&row["position"]),
                );
            }
            println!("\n  {} symbol(s)", rows.len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}

fn format_position(value: &serde_json::Value) -> String {
    match (value["x"].as_f64(), value["y"].as_f64()) {
        (Some(x), Some(y)) => format!("({}, {})", x, y),
        _ => String::new(),
    }
}

fn parse_numbers(raw: &str, expected: usize) -> anyhow::Result<Vec<f64>> {
    let numbers = raw
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("'{}' is not a list of numbers", raw))?;
    if numbers.len() != expected {
        bail!("expected {} comma-separated numbers, got '{}'", expected, raw);
    }
    Ok(numbers)
}

fn handle_query(
    file: &Path,
    circle: Option<String>,
    rect: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let doc = load(file)?;
    let positioned: Vec<NodeId> = doc
        .child_nodes(doc.root())
        .into_iter()
        .filter(|id| !doc.points_of(*id).is_empty())
        .collect();

    let found = match (circle, rect) {
        (Some(c), _) => {
            let v = parse_numbers(&c, 3)?;
            spatial::within_circle(&doc, &positioned, Point::new(v[0], v[1]), v[2])
        }
        (None, Some(r)) => {
            let v = parse_numbers(&r, 4)?;
            spatial::within_rectangle(&doc, &positioned, v[0], v[1], v[2], v[3])
        }
        (None, None) => bail!("one of --circle or --rect is required"),
    };

    match format {
        OutputFormat::Human => {
            for id in &found {
                let summary = doc.summary(*id);
                let at = summary
                    .position
                    .map(|p| format!("({}, {})", p.x, p.y))
                    .unwrap_or_default();
                println!(
                    "{:<14} {:<24} {}",
                    summary.entity_type.as_deref().unwrap_or("<untyped>"),
                    summary.value.unwrap_or_default(),
                    at
                );
            }
            println!("\n  {} element(s)", found.len());
        }
        OutputFormat::Json => {
            let summaries: Vec<_> = found.iter().map(|id| doc.summary(*id)).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
    }
    Ok(())
}

fn handle_net(file: &Path, reference: &str, pin: &str) -> anyhow::Result<()> {
    let sch = Schematic::load(file).with_context(|| format!("failed to load {}", file.display()))?;
    let doc = sch.document();
    let symbol = sch.symbol(reference)?;
    let pin = symbol.pin(pin)?;
    let location = pin.location()?;

    println!(
        "{} pin {} at ({}, {})",
        reference,
        pin.key().unwrap_or_default(),
        location.point().x,
        location.point().y
    );
    println!("  Wires:         {}", pin.attached_wires().len());
    let names = |ids: Vec<NodeId>| -> String {
        ids.iter()
            .filter_map(|id| doc.text(*id))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("  Labels:        {}", names(pin.attached_labels()));
    println!("  Global labels: {}", names(pin.attached_global_labels()));
    Ok(())
}

fn handle_rewrite(file: &Path, output: Option<PathBuf>, compact: bool) -> anyhow::Result<()> {
    let doc = load(file)?;
    let options = if compact {
        WriteOptions::compact()
    } else {
        WriteOptions::default()
    };
    let target = output.unwrap_or_else(|| file.to_path_buf());
    doc.write_with(&target, &options)
        .with_context(|| format!("failed to write {}", target.display()))?;
    if !doc.skipped().is_empty() {
        eprintln!(
            "Warning: {} entr(y/ies) could not be parsed and were copied verbatim",
            doc.skipped().len()
        );
    }
    println!("Wrote {}", target.display());
    Ok(())
}
