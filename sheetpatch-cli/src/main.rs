use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sheetpatch_core::config::DEFAULT_CONFIG_FILE;
use sheetpatch_core::source::fetch_url;
use sheetpatch_core::{CellRef, EditSession, RawValue, SessionConfig};
use std::fs;
use std::path::{Path, PathBuf};

mod formatter;
mod logging;

#[derive(Parser)]
#[command(name = "sheetpatch")]
#[command(about = "Edit a region of an Excel workbook without losing its formatting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Increase log output (-v info, -vv debug); SHEETPATCH_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// List the editable regions of a workbook
    Regions {
        #[command(flatten)]
        input: Input,
    },
    /// Print the grid of one region
    Show {
        #[command(flatten)]
        input: Input,

        /// Region index as printed by `regions`
        #[arg(short, long, default_value_t = 0)]
        region: usize,
    },
    /// Write edits into one region and save the workbook
    Apply {
        #[command(flatten)]
        input: Input,

        /// Region index as printed by `regions`
        #[arg(short, long, default_value_t = 0)]
        region: usize,

        /// JSON array of rows replacing the grid from its top-left corner
        #[arg(short, long, value_name = "GRID")]
        grid: Option<PathBuf>,

        /// Single edit as CELL=VALUE, e.g. B2=42 (repeatable)
        #[arg(short, long = "set", value_name = "CELL=VALUE")]
        set: Vec<String>,

        /// Write to this path instead of saving in place
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Regenerate the workbook from its data (drops formatting)
        #[arg(long, requires = "output")]
        data_only: bool,

        /// Print the patches without saving
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Input {
    /// Path to the workbook
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Load the workbook from a URL instead of a file
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Regions { input } => {
            let session = open(&input, config)?;
            match cli.format {
                OutputFormat::Human => formatter::print_regions_human(&session),
                OutputFormat::Json => formatter::print_regions_json(&session)?,
            }
        }
        Command::Show { input, region } => {
            let mut session = open(&input, config)?;
            let label = region_label(&session, region)?;
            let view = session.render(region)?;
            match cli.format {
                OutputFormat::Human => formatter::print_view_human(&label, view),
                OutputFormat::Json => formatter::print_view_json(&label, view)?,
            }
        }
        Command::Apply {
            input,
            region,
            grid,
            set,
            output,
            data_only,
            dry_run,
        } => {
            let mut session = open(&input, config)?;
            session.render(region)?;

            if let Some(grid_path) = &grid {
                session.replace_grid(read_grid(grid_path)?)?;
            }
            for edit in &set {
                let (cell, value) = parse_edit(edit)?;
                session.set_address(cell, value)?;
            }

            let patches = session.pending_patches()?;
            if dry_run {
                match cli.format {
                    OutputFormat::Human => formatter::print_patches_human(&patches),
                    OutputFormat::Json => formatter::print_patches_json(&patches)?,
                }
                return Ok(());
            }

            let report = match (&output, data_only) {
                (Some(path), true) => {
                    let download = session.download_data_only()?;
                    download.save_as(path)?;
                    formatter::SaveReport::data_only(path, patches.len())
                }
                (Some(path), false) => {
                    let (download, outcome) = session.download()?;
                    download.save_as(path)?;
                    formatter::SaveReport::new(path, patches.len(), &outcome)
                }
                (None, _) => {
                    let Some(path) = &input.file else {
                        bail!("A workbook loaded from a URL needs --output to be saved");
                    };
                    let outcome = session.save_in_place()?;
                    formatter::SaveReport::new(path, patches.len(), &outcome)
                }
            };

            match cli.format {
                OutputFormat::Human => formatter::print_save_human(&report),
                OutputFormat::Json => formatter::print_save_json(&report)?,
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    if let Some(config_path) = path {
        return SessionConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    // Fall back to a config file in the current directory, if any
    let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default_config_path.exists() {
        SessionConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(SessionConfig::default())
    }
}

fn open(input: &Input, config: SessionConfig) -> Result<EditSession> {
    match (&input.file, &input.url) {
        (Some(path), _) => EditSession::open_file(path, config),
        (None, Some(url)) => {
            let source = fetch_url(url).with_context(|| format!("Failed to fetch {}", url))?;
            EditSession::load(source, None, config)
        }
        (None, None) => bail!("Either FILE or --url is required"),
    }
}

fn region_label(session: &EditSession, index: usize) -> Result<String> {
    let region = session
        .regions()
        .get(index)
        .with_context(|| format!("Region {} does not exist", index))?;
    Ok(session.region_label(region))
}

/// `B2=42` -> (B2, "42"). The value is normalised later like any grid input.
fn parse_edit(edit: &str) -> Result<(CellRef, RawValue)> {
    let (cell, value) = edit
        .split_once('=')
        .with_context(|| format!("Expected CELL=VALUE, got '{}'", edit))?;
    let cell = CellRef::from_a1(cell.trim())
        .with_context(|| format!("Invalid cell address '{}'", cell))?;
    Ok((cell, RawValue::from(value)))
}

fn read_grid(path: &Path) -> Result<Vec<Vec<RawValue>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read grid from {}", path.display()))?;
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of rows", path.display()))?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(RawValue::from).collect())
        .collect())
}
