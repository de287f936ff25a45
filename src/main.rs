use anyhow::Context;
use clap::{Parser, Subcommand};
use sheetmap::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sheetmap")]
#[command(about = "Map spreadsheet rows to records and records back to rows")]
#[command(long_about = "Sheetmap - spreadsheet rows <-> records

COMMANDS:
  read     - Read a sheet into JSON records
  write    - Stream JSON records into a sheet using its header as a template
  unmerge  - Flatten merged cells into repeated values

EXAMPLES:
  sheetmap read report.xlsx --sheet Sheet1 --start-row 2 --unmerge
  sheetmap read report.xlsx -s Sheet1 --map columns.yaml -o records.json
  sheetmap write template.xlsx -s Orders -i orders.json --drop-sample-row
  sheetmap unmerge report.xlsx -s Sheet1

Set RUST_LOG=sheetmap=debug for detailed logs on stderr.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Read a sheet into JSON records.

Each row at or below --start-row becomes one record. Fields are named by
column letter (A, B, ...) unless a column map is given.

COLUMN MAP (YAML or JSON):
  A: id
  B: name

  Unmapped columns are dropped.

MERGED CELLS:
  --unmerge copies each merged region's value into every cell it covers
  before reading. The file itself is not modified.")]
    /// Read a sheet into JSON records
    Read {
        /// Path to the .xlsx file
        file: PathBuf,

        /// Sheet to read
        #[arg(short, long, env = "SHEETMAP_SHEET")]
        sheet: String,

        /// First row to read (1-based)
        #[arg(short = 'r', long, default_value = "1")]
        start_row: u32,

        /// Flatten merged cells before reading
        #[arg(short, long)]
        unmerge: bool,

        /// Column map file (column letter -> field name)
        #[arg(short, long)]
        map: Option<PathBuf>,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(long_about = "Stream JSON records into a sheet.

The sheet's first row is the header template. Each header cell is either
literal text (the record field of that name, or the header text itself when
the record lacks it) or a template:

  {{.amount | fen2yuan}}     -> 12345 becomes 123.45
  ={{.a}}+{{.b}}             -> written as a formula cell

Existing rows are kept. Records are written from --start-row, or after the
last existing row when omitted.

EXAMPLE:
  sheetmap write template.xlsx -s Orders -i orders.json --drop-sample-row")]
    /// Stream JSON records into a sheet
    Write {
        /// Path to the .xlsx file (header row + at least one more row)
        file: PathBuf,

        /// Sheet to write
        #[arg(short, long, env = "SHEETMAP_SHEET")]
        sheet: String,

        /// JSON file holding an array of objects
        #[arg(short, long)]
        input: PathBuf,

        /// First row to write (1-based); defaults to after the last row
        #[arg(short = 'r', long)]
        start_row: Option<u32>,

        /// Records per batch sent to the writer
        #[arg(short, long, default_value = "100", env = "SHEETMAP_BATCH_SIZE")]
        batch_size: usize,

        /// Remove row 2 (the sample row under the header) before writing
        #[arg(long)]
        drop_sample_row: bool,
    },

    /// Flatten merged cells into repeated values and save
    Unmerge {
        /// Path to the .xlsx file
        file: PathBuf,

        /// Sheet to normalize
        #[arg(short, long, env = "SHEETMAP_SHEET")]
        sheet: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `read` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetmap=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Read {
            file,
            sheet,
            start_row,
            unmerge,
            map,
            output,
        } => cli::read(file.clone(), sheet, start_row, unmerge, map, output)
            .with_context(|| format!("read failed for {}", file.display())),

        Commands::Write {
            file,
            sheet,
            input,
            start_row,
            batch_size,
            drop_sample_row,
        } => cli::write(file.clone(), sheet, input, start_row, batch_size, drop_sample_row)
            .await
            .with_context(|| format!("write failed for {}", file.display())),

        Commands::Unmerge { file, sheet } => cli::unmerge(file.clone(), sheet)
            .with_context(|| format!("unmerge failed for {}", file.display())),
    }
}
