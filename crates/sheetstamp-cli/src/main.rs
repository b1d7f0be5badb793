//! sheetstamp CLI - fill spreadsheet templates and stamp serial-numbered copies

mod console;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use sheetstamp::prelude::*;
use sheetstamp::timestamped_file_name;

use crate::console::Console;

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "sheetstamp")]
#[command(
    author,
    version,
    about = "Fill spreadsheet templates and generate serial-numbered copies"
)]
struct Cli {
    /// Configuration file (default: config.json next to the executable)
    #[arg(short, long, global = true, env = "SHEETSTAMP_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured templates
    #[command(alias = "ls")]
    List,

    /// Show the input fields of a template
    Fields {
        category: String,
        template: String,
    },

    /// Generate serial-numbered copies of a template
    #[command(alias = "gen")]
    Generate {
        /// Category (chosen interactively when omitted)
        category: Option<String>,

        /// Template name (chosen from the category's list when omitted)
        #[arg(requires = "category")]
        template: Option<String>,

        /// Value for a field, COORDINATE=VALUE; repeatable
        #[arg(short = 's', long = "set", value_parser = parse_assignment)]
        values: Vec<(String, String)>,

        /// Number of copies (prompted when omitted)
        #[arg(short = 'n', long, value_parser = parse_quantity_arg)]
        quantity: Option<u32>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Fill a single document without serial numbering
    Fill {
        category: String,
        template: String,

        /// Value for a field, COORDINATE=VALUE; repeatable
        #[arg(short = 's', long = "set", value_parser = parse_assignment)]
        values: Vec<(String, String)>,

        /// Output file (default: timestamped name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Commands::List => list_templates(&config_path),
        Commands::Fields { category, template } => show_fields(&config_path, &category, &template),
        Commands::Generate {
            category,
            template,
            values,
            quantity,
            output,
        } => run_generate(&config_path, category, template, values, quantity, &output),
        Commands::Fill {
            category,
            template,
            values,
            output,
        } => run_fill(&config_path, &category, &template, values, output),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(DEFAULT_CONFIG_FILE))
}

fn load_config(path: &Path) -> Result<Configuration> {
    Configuration::load(path).with_context(|| format!("Failed to load '{}'", path.display()))
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((coordinate, value)) if !coordinate.trim().is_empty() => {
            Ok((coordinate.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected COORDINATE=VALUE, got '{}'", raw)),
    }
}

fn parse_quantity_arg(raw: &str) -> std::result::Result<u32, String> {
    parse_quantity(raw).map_err(|e| e.to_string())
}

fn stdio_console() -> Console<io::StdinLock<'static>, io::Stdout> {
    Console::new(io::stdin().lock(), io::stdout())
}

fn list_templates(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    if config.templates().next().is_none() {
        eprintln!("No templates configured in '{}'", config_path.display());
        return Ok(());
    }
    stdio_console().list_templates(&config)?;
    Ok(())
}

fn show_fields(config_path: &Path, category: &str, template: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let spec = config.template(category, template)?;
    let fields = template_fields(spec)
        .with_context(|| format!("Failed to read '{}'", spec.resolved_path().display()))?;

    println!("{} / {} ({})", category, template, spec.resolved_path().display());
    for field in &fields {
        let marker = if field.serial { "  [serial]" } else { "" };
        println!("  {:<12} {}{}", field.coordinate, field.label, marker);
    }
    Ok(())
}

fn run_generate(
    config_path: &Path,
    category: Option<String>,
    template: Option<String>,
    preset: Vec<(String, String)>,
    quantity: Option<u32>,
    output_dir: &Path,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    let mut console = stdio_console();

    let (category, template) = console.resolve_template(&config, category, template)?;

    let spec = config.template(&category, &template)?;
    let fields = template_fields(spec)
        .with_context(|| format!("Failed to read '{}'", spec.resolved_path().display()))?;

    let preset: UserInputs = preset.into_iter().collect();
    let inputs = console.collect_values(&fields, &preset)?;
    let quantity = match quantity {
        Some(quantity) => quantity,
        None => console.ask_quantity()?,
    };

    let request = BatchRequest {
        category,
        template,
        inputs,
        quantity,
        output_dir: output_dir.to_path_buf(),
    };

    let outcome = match generate(&mut config, &request) {
        Ok(outcome) => outcome,
        Err(Error::BatchAborted { completed, source }) => {
            for path in &completed {
                println!("Generated: {}", path.display());
            }
            bail!(
                "Generation stopped after {} file(s); counters were not saved: {}",
                completed.len(),
                source
            );
        }
        Err(e) => return Err(e).context("Generation failed"),
    };

    report_and_save(&mut io::stdout(), &config, config_path, &outcome)
}

/// List the generated files, then persist the counters.
///
/// The files are already on disk, so they are reported even when the
/// configuration cannot be written.
fn report_and_save<W: Write>(
    out: &mut W,
    config: &Configuration,
    config_path: &Path,
    outcome: &BatchOutcome,
) -> Result<()> {
    for path in &outcome.files {
        writeln!(out, "Generated: {}", path.display())?;
    }
    for warning in &outcome.warnings {
        eprintln!("Warning: {}", warning);
    }

    config.save(config_path).with_context(|| {
        format!(
            "Generated {} file(s) but could not save serial counters to '{}'",
            outcome.files.len(),
            config_path.display()
        )
    })
}

fn run_fill(
    config_path: &Path,
    category: &str,
    template: &str,
    preset: Vec<(String, String)>,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let spec = config.template(category, template)?;
    let fields = template_fields(spec)
        .with_context(|| format!("Failed to read '{}'", spec.resolved_path().display()))?;

    let preset: UserInputs = preset.into_iter().collect();
    let inputs = stdio_console().collect_values(&fields, &preset)?;

    let output = output.unwrap_or_else(|| {
        PathBuf::from(timestamped_file_name(
            template,
            chrono::Local::now().naive_local(),
        ))
    });

    let result = fill_document(&config, category, template, &inputs, &output)
        .with_context(|| format!("Failed to fill '{}'", output.display()))?;

    println!("Saved: {}", result.path.display());
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }
    Ok(())
}
