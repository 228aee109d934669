use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use cmd::commands::{self, CatalogChoice, IngestOptions, OutputFormat, RegisterEntry};
use cmd::StoreContext;
use odm::{
    Filter, MethodDefinition, ProcessingLevelDefinition, ResultId, ResultKind, TableMapping,
    UnitDefinition, VariableDefinition,
};

#[derive(Parser)]
#[command(author, version, about = "Environmental observations store", long_about = None)]
#[command(name = "odm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store database file (defaults to ODM_STORE)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// YAML configuration file (defaults to ODM_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty store
    Init,
    /// Add an entry to a catalog
    #[command(subcommand)]
    Register(RegisterCommand),
    /// Insert the mapped columns of a CSV file
    Ingest(IngestArgs),
    /// Print stored values
    Query(QueryArgs),
    /// Run a derivation declared in YAML
    Derive {
        /// Derivation file
        spec: PathBuf,
    },
    /// Show how a result was produced
    Lineage {
        /// Result id
        result: i64,
    },
    /// List a catalog
    Catalog {
        #[arg(value_enum)]
        which: CatalogArg,
    },
}

#[derive(Subcommand)]
enum RegisterCommand {
    /// A measurement unit
    Unit { name: String },
    /// A variable definition
    Variable {
        #[arg(long)]
        code: String,
        /// Controlled-vocabulary variable name
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        variable_type: String,
        #[arg(long, default_value = "")]
        definition: String,
    },
    /// A method or procedure
    Method {
        #[arg(long)]
        code: String,
        #[arg(long = "type")]
        method_type: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// A processing level
    Level {
        label: String,
        #[arg(long, default_value = "")]
        definition: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Measurement,
    Timeseries,
}

impl From<KindArg> for ResultKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Measurement => ResultKind::Measurement,
            KindArg::Timeseries => ResultKind::TimeSeries,
        }
    }
}

#[derive(Args)]
struct IngestArgs {
    /// CSV file with a header row
    file: PathBuf,
    #[arg(long)]
    timestamp_column: String,
    #[arg(long)]
    site_column: String,
    /// COLUMN=VARIABLE:UNIT, repeatable
    #[arg(long = "value", required = true)]
    values: Vec<String>,
    /// Method code
    #[arg(long)]
    method: String,
    /// Processing level label
    #[arg(long, default_value = "Raw data")]
    level: String,
    #[arg(long, value_enum, default_value = "timeseries")]
    kind: KindArg,
    #[arg(long)]
    medium: Option<String>,
    /// Type given to newly created sampling features
    #[arg(long)]
    feature_type: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long)]
    variable_name: Option<String>,
    #[arg(long)]
    variable_code: Option<String>,
    #[arg(long)]
    site: Option<String>,
    #[arg(long)]
    method: Option<String>,
    #[arg(long)]
    level: Option<String>,
    /// table, csv or count
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum CatalogArg {
    Units,
    Variables,
    Methods,
    Levels,
    Sites,
}

impl From<CatalogArg> for CatalogChoice {
    fn from(arg: CatalogArg) -> Self {
        match arg {
            CatalogArg::Units => CatalogChoice::Units,
            CatalogArg::Variables => CatalogChoice::Variables,
            CatalogArg::Methods => CatalogChoice::Methods,
            CatalogArg::Levels => CatalogChoice::Levels,
            CatalogArg::Sites => CatalogChoice::Sites,
        }
    }
}

#[allow(clippy::print_stdout)]
fn print(line: &str) {
    println!("{line}");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        diagnostics::init_with_level(diagnostics::LogLevel::Debug);
    } else {
        diagnostics::init_diagnostics();
    }

    let ctx = StoreContext::new(cli.store, cli.config);
    match cli.command {
        Commands::Init => commands::init_command(&ctx, print),
        Commands::Register(what) => {
            let entry = match what {
                RegisterCommand::Unit { name } => RegisterEntry::Unit(UnitDefinition::new(name)),
                RegisterCommand::Variable {
                    code,
                    name,
                    variable_type,
                    definition,
                } => RegisterEntry::Variable(VariableDefinition::new(
                    code,
                    name,
                    variable_type,
                    definition,
                )),
                RegisterCommand::Method {
                    code,
                    method_type,
                    description,
                } => RegisterEntry::Method(MethodDefinition::new(code, method_type, description)),
                RegisterCommand::Level { label, definition } => {
                    RegisterEntry::Level(ProcessingLevelDefinition::new(label, definition))
                }
            };
            commands::register_command(&ctx, &entry, print)
        }
        Commands::Ingest(args) => {
            let mut mapping = TableMapping::new(args.timestamp_column, args.site_column);
            for value in &args.values {
                mapping.values.push(commands::parse_value_mapping(value)?);
            }
            let options = IngestOptions {
                kind: args.kind.into(),
                method: args.method,
                processing_level: args.level,
                sampled_medium: args.medium,
                feature_type: args.feature_type,
                description: args.description,
            };
            commands::ingest_command(&ctx, &args.file, &mapping, &options, print)
        }
        Commands::Query(args) => {
            let filter = Filter {
                variable_name: args.variable_name,
                variable_code: args.variable_code,
                site_code: args.site,
                method_code: args.method,
                processing_level: args.level,
                ..Filter::default()
            };
            commands::query_command(&ctx, &filter, args.format, print)
        }
        Commands::Derive { spec } => commands::derive_command(&ctx, &spec, print),
        Commands::Lineage { result } => {
            commands::lineage_command(&ctx, ResultId(result), print)
        }
        Commands::Catalog { which } => commands::catalog_command(&ctx, which.into(), print),
    }
}
