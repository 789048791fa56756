use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use ignore::WalkBuilder;
use rayon::prelude::*;
use tower_lsp::lsp_types::Url;

use bitbake_ls::analysis::SubLanguage;
use bitbake_ls::analyzer::{AnalyzedDocument, Analyzer};
use bitbake_ls::config::Config;
use bitbake_ls::embedded::synthesize;
use bitbake_ls::error::{BitbakeError, Result};
use bitbake_ls::resolver::{self, is_metadata, FileEvent, InventoryWatcher};

#[derive(Parser)]
#[command(name = "bitbake-ls")]
#[command(about = "Language server and inspection tools for BitBake metadata")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Run the language server on stdio
    bitbake-ls serve

    # Print the shell shadow of a recipe
    bitbake-ls shadow recipes-core/foo/foo_1.0.bb --language shell

    # List the declarations of a class as JSON
    bitbake-ls declarations classes/image.bbclass --format json

    # Show where the directives of a recipe lead
    bitbake-ls resolve foo_1.0.bb --layer poky/meta --layer meta-custom

    # Build the inventory of a layer tree and keep it current
    bitbake-ls scan poky/meta meta-custom --watch

    # Report parse errors across a layer
    bitbake-ls check meta-custom
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the language server on stdio
    Serve,

    /// Print the shadow document of one sub-language
    Shadow {
        /// Recipe, class, include or append file
        file: PathBuf,

        /// Sub-language: shell or python
        #[arg(long, short, default_value = "shell")]
        language: SubLanguage,

        /// Print the offset table instead of the text
        #[arg(long)]
        offsets: bool,
    },

    /// List the global declarations of a file
    Declarations {
        file: PathBuf,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Resolve the inherit, include and require directives of a file
    Resolve {
        file: PathBuf,

        /// Layer root to search (repeatable; defaults to the current directory)
        #[arg(long = "layer")]
        layers: Vec<PathBuf>,

        /// Pre-built inventory JSON used instead of scanning
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Saved `bitbake -e` output
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Print the inventory of classes, includes, recipes and appends as JSON
    Scan {
        /// Layer roots
        #[arg(default_value = ".")]
        roots: Vec<PathBuf>,

        /// Print a fresh inventory whenever metadata changes
        #[arg(long)]
        watch: bool,
    },

    /// Parse every metadata file under the given paths and report errors
    Check {
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
}

fn analyze_file(path: &Path) -> Result<AnalyzedDocument> {
    let text = std::fs::read_to_string(path)?;
    let absolute = std::fs::canonicalize(path)?;
    let uri = Url::from_file_path(&absolute).map_err(|_| BitbakeError::Uri(absolute.display().to_string()))?;
    Ok(AnalyzedDocument::analyze(uri, None, &text))
}

pub fn print_shadow(file: &Path, language: SubLanguage, offsets: bool) -> Result<()> {
    let document = analyze_file(file)?;
    let Some(shadow) = synthesize(&document.synthesis_input(), language) else {
        eprintln!("No {} code in {}", language, file.display());
        return Ok(());
    };
    if offsets {
        println!("{}", serde_json::to_string(shadow.offset_map().as_slice())?);
    } else {
        print!("{}", shadow.content());
    }
    Ok(())
}

pub fn print_declarations(file: &Path, format: &str) -> Result<()> {
    let document = analyze_file(file)?;
    if format == "json" {
        let declarations: Vec<_> = document.declarations.values().collect();
        println!("{}", serde_json::to_string_pretty(&declarations)?);
        return Ok(());
    }

    if document.declarations.is_empty() {
        println!("No declarations in {}", file.display());
        return Ok(());
    }
    for declaration in document.declarations.values() {
        let line = declaration.location.range.start.line + 1;
        match &declaration.value {
            Some(value) => println!("{:>5}  {:?} {} = {}", line, declaration.kind, declaration.name, value),
            None => println!("{:>5}  {:?} {}", line, declaration.kind, declaration.name),
        }
    }
    Ok(())
}

pub fn resolve_directives(
    file: &Path,
    layers: Vec<PathBuf>,
    inventory: Option<PathBuf>,
    trace: Option<PathBuf>,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let layer_roots = if layers.is_empty() { vec![cwd.clone()] } else { layers };
    let mut config = Config {
        layer_roots,
        inventory_file: inventory,
        trace_file: trace,
        embedded: false,
        ..Config::default()
    };
    config.resolve_paths(&cwd);

    let analyzer = Analyzer::new(config.clone());
    analyzer.refresh_inventory()?;
    if let Some(trace) = &config.trace_file {
        analyzer.load_trace(trace)?;
    }

    let document = analyze_file(file)?;
    let text = document.text().to_string();
    let document = analyzer.analyze(&document.uri, None, &text);
    if document.directives.is_empty() {
        println!("No directives in {}", file.display());
        return Ok(());
    }
    for directive in &document.directives {
        let targets = analyzer.directive_targets_at(&document.uri, directive.range.start);
        println!(
            "{}:{} {:?} {}",
            file.display(),
            directive.range.start.line + 1,
            directive.kind,
            directive.argument
        );
        if targets.is_empty() {
            println!("    (not found)");
        }
        for target in targets {
            println!("    {}", target.display());
        }
    }
    Ok(())
}

pub fn scan_layers(roots: &[PathBuf], watch: bool) -> Result<()> {
    let inventory = resolver::scan(roots);
    println!("{}", inventory.to_json()?);
    if !watch {
        return Ok(());
    }

    let watcher = InventoryWatcher::new(roots, Duration::from_millis(500))?;
    eprintln!("Watching {} root(s) for changes. Press Ctrl+C to stop.", roots.len());
    while let Some(events) = watcher.recv() {
        for event in &events {
            match event {
                FileEvent::Modified(path) => eprintln!("Changed {}", path.display()),
                FileEvent::Deleted(path) => eprintln!("Removed {}", path.display()),
            }
        }
        println!("{}", resolver::scan(roots).to_json()?);
    }
    Ok(())
}

/// Returns the number of files with parse errors.
pub fn check_paths(paths: &[PathBuf]) -> Result<usize> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkBuilder::new(path).build().filter_map(|e| e.ok()) {
            if entry.file_type().is_some_and(|t| t.is_file()) && is_metadata(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    println!("Checking {} files", files.len());

    // Parallel parsing using rayon
    let mut reports: Vec<(PathBuf, Vec<u32>)> = files
        .par_iter()
        .filter_map(|file| match analyze_file(file) {
            Ok(document) => {
                let lines: Vec<u32> = document
                    .tree
                    .errors()
                    .into_iter()
                    .map(|node| document.lines.position_at(node.start_byte).line + 1)
                    .collect();
                (!lines.is_empty()).then(|| (file.clone(), lines))
            }
            Err(e) => {
                eprintln!("Error reading {}: {}", file.display(), e);
                None
            }
        })
        .collect();
    reports.sort();

    for (file, lines) in &reports {
        for line in lines {
            println!("{}:{}: cannot parse statement", file.display(), line);
        }
    }
    println!("{} of {} files have parse errors", reports.len(), files.len());
    Ok(reports.len())
}
