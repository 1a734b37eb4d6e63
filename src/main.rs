use clap::{Parser, Subcommand, ValueEnum};
use neuropipe::analysis::{registry, Analysis, AnalysisClass, AnalysisOptions, ParamValue};
use neuropipe::dataset::Dataset;
use neuropipe::error::Error;
use neuropipe::execute::{
    DerivationPlan, Environment, ExecutionBackend, PlanFormat, PlanWriter, Processor,
};
use neuropipe::input::{FieldFilter, FilesetFilter, InputSource};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, error};

/// Derive neuroimaging outputs from declarative analysis recipes
#[derive(Parser)]
#[command(name = "neuropipe")]
#[command(about = "Plan neuroimaging derivations from declarative recipes", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DatasetType {
    Bids,
    Basic,
    Xnat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProcessorType {
    Single,
    Multi,
    Slurm,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvironmentType {
    Static,
    Modules,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatType {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the derivation of one or more derivatives of an analysis
    Derive {
        /// Dataset directory (or XNAT project ID with --dataset-type xnat)
        dataset: String,

        /// Registered analysis class (see `avail`)
        class: String,

        /// Name for this analysis instance
        name: String,

        /// Derivatives to generate, by data-spec name
        #[arg(required = true)]
        derivatives: Vec<String>,

        #[arg(long, value_enum, default_value_t = DatasetType::Bids)]
        dataset_type: DatasetType,

        /// Subject/visit nesting depth of a basic dataset
        #[arg(long, default_value_t = 0)]
        depth: u32,

        /// XNAT server URL
        #[arg(long)]
        xnat_server: Option<String>,

        /// XNAT user name (passwords are sourced by the engine)
        #[arg(long)]
        xnat_user: Option<String>,

        /// Write derivatives to a separate BIDS dataset
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ProcessorType::Single)]
        processor: ProcessorType,

        /// Worker count for --processor multi
        #[arg(long, default_value_t = 4)]
        num_procs: usize,

        /// SLURM account for --processor slurm
        #[arg(long)]
        account: Option<String>,

        /// SLURM partition for --processor slurm
        #[arg(long)]
        partition: Option<String>,

        /// Notification address for --processor slurm
        #[arg(long)]
        email: Option<String>,

        #[arg(long, value_enum, default_value_t = EnvironmentType::Static)]
        environment: EnvironmentType,

        /// Explicit fileset input: a data-spec name and a filename pattern
        #[arg(long, num_args = 2, value_names = ["SPEC", "PATTERN"], action = clap::ArgAction::Append)]
        input: Vec<String>,

        /// Explicit fileset input matched as a regular expression
        #[arg(long, num_args = 2, value_names = ["SPEC", "PATTERN"], action = clap::ArgAction::Append)]
        input_regex: Vec<String>,

        /// Explicit field input: a data-spec name and a field-name pattern
        #[arg(long, num_args = 2, value_names = ["SPEC", "PATTERN"], action = clap::ArgAction::Append)]
        field: Vec<String>,

        /// Parameter override: a name and a value parsed against the
        /// declared type
        #[arg(long, num_args = 2, value_names = ["NAME", "VALUE"], action = clap::ArgAction::Append)]
        parameter: Vec<String>,

        /// YAML file of parameter overrides (--parameter values win)
        #[arg(long)]
        parameter_file: Option<PathBuf>,

        /// Restrict to these subjects (a single value containing '/' is
        /// read as a file of IDs, one per line)
        #[arg(long, num_args = 1..)]
        subject_ids: Vec<String>,

        /// Restrict to these visits (same file convention as --subject-ids)
        #[arg(long, num_args = 1..)]
        visit_ids: Vec<String>,

        /// Task label to bind task-filterable inputs to
        #[arg(long)]
        task: Option<String>,

        /// Directory plans are written into
        #[arg(long)]
        scratch: Option<PathBuf>,

        /// On-disk plan format
        #[arg(long, value_enum, default_value_t = FormatType::Json)]
        format: FormatType,

        /// Regenerate derivatives whose provenance no longer matches
        #[arg(long)]
        reprocess: bool,
    },
    /// Show the data and parameter specifications of an analysis class
    Menu {
        /// Registered analysis class
        class: String,
    },
    /// List the registered analysis classes
    Avail,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 3)
        .init();

    let result = match cli.command {
        Commands::Derive {
            dataset,
            class,
            name,
            derivatives,
            dataset_type,
            depth,
            xnat_server,
            xnat_user,
            output,
            processor,
            num_procs,
            account,
            partition,
            email,
            environment,
            input,
            input_regex,
            field,
            parameter,
            parameter_file,
            subject_ids,
            visit_ids,
            task,
            scratch,
            format,
            reprocess,
        } => run_derive(DeriveArgs {
            dataset,
            class,
            name,
            derivatives,
            dataset_type,
            depth,
            xnat_server,
            xnat_user,
            output,
            processor,
            num_procs,
            account,
            partition,
            email,
            environment,
            input,
            input_regex,
            field,
            parameter,
            parameter_file,
            subject_ids,
            visit_ids,
            task,
            scratch,
            format,
            reprocess,
        }),
        Commands::Menu { class } => run_menu(&class),
        Commands::Avail => run_avail(),
    };

    if let Err(e) = result {
        error!("fatal: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

struct DeriveArgs {
    dataset: String,
    class: String,
    name: String,
    derivatives: Vec<String>,
    dataset_type: DatasetType,
    depth: u32,
    xnat_server: Option<String>,
    xnat_user: Option<String>,
    output: Option<PathBuf>,
    processor: ProcessorType,
    num_procs: usize,
    account: Option<String>,
    partition: Option<String>,
    email: Option<String>,
    environment: EnvironmentType,
    input: Vec<String>,
    input_regex: Vec<String>,
    field: Vec<String>,
    parameter: Vec<String>,
    parameter_file: Option<PathBuf>,
    subject_ids: Vec<String>,
    visit_ids: Vec<String>,
    task: Option<String>,
    scratch: Option<PathBuf>,
    format: FormatType,
    reprocess: bool,
}

fn run_derive(args: DeriveArgs) -> anyhow::Result<()> {
    let class = registry::resolve(&args.class)?;

    let dataset = match args.dataset_type {
        DatasetType::Bids => Dataset::bids(&args.dataset),
        DatasetType::Basic => Dataset::basic(&args.dataset, args.depth),
        DatasetType::Xnat => {
            let server = args.xnat_server.ok_or_else(|| {
                Error::Usage("--xnat-server is required with --dataset-type xnat".to_string())
            })?;
            Dataset::xnat(&args.dataset, server, args.xnat_user)
        }
    };

    let processor = match args.processor {
        ProcessorType::Single => Processor::Single,
        ProcessorType::Multi => Processor::Multi {
            num_procs: args.num_procs,
        },
        ProcessorType::Slurm => Processor::Slurm {
            account: args.account,
            partition: args.partition,
            email: args.email,
        },
    };

    let environment = match args.environment {
        EnvironmentType::Static => Environment::Static,
        EnvironmentType::Modules => Environment::Modules,
    };

    let mut parameters = match args.parameter_file {
        Some(path) => load_parameter_file(&path)?,
        None => BTreeMap::new(),
    };
    parameters.extend(parse_parameters(class, &args.parameter)?);

    let options = AnalysisOptions {
        inputs: parse_inputs(class, &args.input, &args.input_regex, &args.field)?,
        parameters,
        task: args.task,
        subject_ids: load_ids(args.subject_ids)?,
        visit_ids: load_ids(args.visit_ids)?,
    };

    let analysis = Analysis::new(class, args.name, dataset, processor, environment, options)?;
    debug!(
        class = class.name(),
        inputs = analysis.inputs().len(),
        "analysis instantiated"
    );

    let mut plan =
        DerivationPlan::assemble(&analysis, &args.derivatives)?.with_reprocess(args.reprocess);
    if let Some(output) = args.output {
        plan = plan.with_output_dataset(Dataset::bids(output));
    }

    let scratch = match args.scratch {
        Some(dir) => dir,
        None => default_scratch_dir()?,
    };
    let format = match args.format {
        FormatType::Json => PlanFormat::Json,
        FormatType::Yaml => PlanFormat::Yaml,
    };
    let path = PlanWriter::new(scratch).format(format).submit(&plan)?;
    println!("Plan written to {}", path.display());
    Ok(())
}

/// Pair up the repeated `--input`/`--input-regex`/`--field` values into
/// filters, checking each spec name against the class.
fn parse_inputs(
    class: &'static AnalysisClass,
    filesets: &[String],
    fileset_regexes: &[String],
    fields: &[String],
) -> anyhow::Result<Vec<InputSource>> {
    let mut inputs = Vec::new();
    for pair in filesets.chunks_exact(2) {
        let format = class.data_spec(&pair[0])?.format();
        inputs.push(FilesetFilter::new(&pair[0], &pair[1], format).into());
    }
    for pair in fileset_regexes.chunks_exact(2) {
        let format = class.data_spec(&pair[0])?.format();
        inputs.push(FilesetFilter::new(&pair[0], &pair[1], format).regex()?.into());
    }
    for pair in fields.chunks_exact(2) {
        class.data_spec(&pair[0])?;
        inputs.push(FieldFilter::new(&pair[0], &pair[1]).into());
    }
    Ok(inputs)
}

fn parse_parameters(
    class: &'static AnalysisClass,
    pairs: &[String],
) -> anyhow::Result<BTreeMap<String, ParamValue>> {
    let mut parameters = BTreeMap::new();
    for pair in pairs.chunks_exact(2) {
        let value = class.param_spec(&pair[0])?.parse(&pair[1])?;
        parameters.insert(pair[0].clone(), value);
    }
    Ok(parameters)
}

/// Name/value overrides from a YAML mapping. Types are checked against
/// the class's declarations when the analysis is instantiated.
fn load_parameter_file(path: &std::path::Path) -> anyhow::Result<BTreeMap<String, ParamValue>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// A single value containing '/' names a file of IDs, one per line.
fn load_ids(values: Vec<String>) -> anyhow::Result<Option<Vec<String>>> {
    match values.as_slice() {
        [] => Ok(None),
        [single] if single.contains('/') => {
            let contents = std::fs::read_to_string(single)?;
            Ok(Some(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ))
        }
        _ => Ok(Some(values)),
    }
}

fn default_scratch_dir() -> anyhow::Result<PathBuf> {
    let dirs = directories::UserDirs::new()
        .ok_or_else(|| Error::Usage("could not determine a home directory".to_string()))?;
    Ok(dirs.home_dir().join("neuropipe-scratch"))
}

fn run_menu(class: &str) -> anyhow::Result<()> {
    let class = registry::resolve(class)?;
    print!("{}", class.menu());
    Ok(())
}

fn run_avail() -> anyhow::Result<()> {
    let width = registry::all()
        .map(|c| c.name().len())
        .max()
        .unwrap_or(0);
    for class in registry::all() {
        println!("{:width$}    {}", class.name(), class.description());
    }
    Ok(())
}
