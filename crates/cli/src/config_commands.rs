use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Args};

use switchyard_config::{Severity, ValidationResult, load_or_discover, validate};

#[derive(Args)]
pub struct ConfigArgs {
    /// Also validate the configuration and report errors/warnings.
    #[arg(long)]
    validate: bool,
    /// Show informational diagnostics in addition to errors and warnings.
    #[arg(long, requires = "validate")]
    verbose: bool,
}

/// Print the effective configuration as TOML, optionally followed by diagnostics.
pub fn handle_config(args: ConfigArgs, path: Option<PathBuf>) -> Result<()> {
    show(path.as_deref())?;
    if args.validate {
        check(path.as_deref(), args.verbose);
    }
    Ok(())
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>, verbose: bool) {
    let result = validate(path);

    if let Some(ref path) = result.config_path {
        eprintln!("\nChecking {}\n", path.display());
    } else {
        eprintln!("\nNo config file found; checking defaults.\n");
    }

    print_diagnostics(&result, verbose);

    if result.has_errors() {
        std::process::exit(1);
    }
}

/// Print diagnostics to stderr with a summary line.
fn print_diagnostics(result: &ValidationResult, verbose: bool) {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}

fn show(path: Option<&Path>) -> Result<()> {
    let config = load_or_discover(path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
