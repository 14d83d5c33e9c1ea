//! facestate CLI - Command-line interface for facial-state
//!
//! Commands:
//! - analyze: Compare a neutral and a target face
//! - generate: Build diff vectors, automaton and Turing machine for sad/happy
//! - decide: Re-read generated diff vectors and decide them
//! - inspect: Summarize generated diff vectors per region
//! - simulate: Run a Turing machine JSON on an input string
//! - majority: Print the majority machine for a tape length

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use facial_state::automaton::{decide_values, VectorDecision};
use facial_state::difference::{summarize_meta, DEFAULT_SUMMARY_TOP_K};
use facial_state::turing::DEFAULT_MAX_STEPS;
use facial_state::types::{DiffSummary, RawDiffMeta};
use facial_state::{
    majority_machine, map_regions, AnalysisError, FacialStatePipeline,
    LandmarkExtractor, LandmarkFileExtractor, PipelineConfig, TuringMachine, VERSION,
};

const SAD_META: &str = "diff_neutral_sad_meta.json";
const SAD_GRAPH: &str = "diff_neutral_sad_graph.json";
const HAPPY_META: &str = "diff_neutral_happy_meta.json";
const HAPPY_GRAPH: &str = "diff_neutral_happy_graph.json";
const AUTOMATON: &str = "automaton.json";
const TURING_MACHINE: &str = "turing_machine.json";
const SUMMARY: &str = "summary.json";

/// facestate - Landmark difference analysis for facial expressions
#[derive(Parser)]
#[command(name = "facestate")]
#[command(version = VERSION)]
#[command(about = "Classify facial expression changes from landmarks", long_about = None)]
struct Cli {
    /// Log pipeline stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a neutral and a target face
    Analyze {
        /// Neutral landmark file (.json or OpenFace .csv)
        #[arg(long)]
        neutral: PathBuf,

        /// Target landmark file
        #[arg(long)]
        target: PathBuf,

        /// Change threshold (<= 1.0 fraction of face scale, > 1.0 pixels)
        #[arg(long)]
        threshold: Option<f64>,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Pretty-print the outcome
        #[arg(long)]
        pretty: bool,
    },

    /// Build diff vectors, automaton and Turing machine for a sad/happy pair
    Generate {
        #[arg(long)]
        neutral: PathBuf,

        #[arg(long)]
        sad: PathBuf,

        #[arg(long)]
        happy: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Change threshold (<= 1.0 fraction of face scale, > 1.0 pixels)
        #[arg(long)]
        threshold: Option<f64>,

        /// Pipeline configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Decide the generated diff vectors by first symbol and by majority
    Decide {
        /// Directory written by `generate`
        #[arg(long)]
        dir: PathBuf,
    },

    /// Summarize the generated diff vectors per region
    Inspect {
        /// Directory written by `generate`
        #[arg(long)]
        dir: PathBuf,

        /// Neutral landmark file used to map regions
        #[arg(long)]
        neutral: PathBuf,

        /// Number of largest displacements to list
        #[arg(long, default_value_t = DEFAULT_SUMMARY_TOP_K)]
        top_k: usize,

        /// Pipeline configuration JSON (for the banding scheme)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a Turing machine JSON on an input string
    Simulate {
        /// Machine spec or turing_machine.json
        #[arg(long)]
        machine: PathBuf,

        /// Input written to the tape
        #[arg(long)]
        input: String,

        #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
        max_steps: usize,

        /// Record every step
        #[arg(long)]
        trace: bool,
    },

    /// Print the majority machine for tapes of a given length
    Majority {
        /// Tape length
        #[arg(long)]
        length: usize,

        /// Print Graphviz DOT instead of JSON
        #[arg(long)]
        dot: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), FaceCliError> {
    match cli.command {
        Commands::Analyze {
            neutral,
            target,
            threshold,
            config,
            pretty,
        } => cmd_analyze(&neutral, &target, threshold, config.as_deref(), pretty),

        Commands::Generate {
            neutral,
            sad,
            happy,
            out,
            threshold,
            config,
        } => cmd_generate(&neutral, &sad, &happy, &out, threshold, config.as_deref()),

        Commands::Decide { dir } => cmd_decide(&dir),

        Commands::Inspect {
            dir,
            neutral,
            top_k,
            config,
        } => cmd_inspect(&dir, &neutral, top_k, config.as_deref()),

        Commands::Simulate {
            machine,
            input,
            max_steps,
            trace,
        } => cmd_simulate(&machine, &input, max_steps, trace),

        Commands::Majority { length, dot } => cmd_majority(length, dot),
    }
}

/// Load the configuration file if given, then apply a threshold override
fn load_config(path: Option<&Path>, threshold: Option<f64>) -> Result<PipelineConfig, FaceCliError> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = threshold {
        config = config.with_threshold(threshold);
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), FaceCliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), FaceCliError> {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    tracing::debug!(path = %path.display(), "wrote artifact");
    Ok(())
}

fn read_meta(dir: &Path, name: &str) -> Result<RawDiffMeta, FaceCliError> {
    let path = dir.join(name);
    let json = fs::read_to_string(&path).map_err(|e| FaceCliError::MissingArtifact(path.clone(), e))?;
    Ok(serde_json::from_str(&json)?)
}

fn cmd_analyze(
    neutral: &Path,
    target: &Path,
    threshold: Option<f64>,
    config: Option<&Path>,
    pretty: bool,
) -> Result<(), FaceCliError> {
    let config = load_config(config, threshold)?;
    let pipeline = FacialStatePipeline::with_config(LandmarkFileExtractor, config)?;

    // Rejects are results, not failures
    let outcome = pipeline.analyze(neutral, target);
    print_json(&outcome, pretty)
}

fn cmd_generate(
    neutral: &Path,
    sad: &Path,
    happy: &Path,
    out: &Path,
    threshold: Option<f64>,
    config: Option<&Path>,
) -> Result<(), FaceCliError> {
    let config = load_config(config, threshold)?;
    let pipeline = FacialStatePipeline::with_config(LandmarkFileExtractor, config)?;
    let report = pipeline.generate_report(neutral, sad, happy)?;

    fs::create_dir_all(out)?;
    write_json(out, SAD_META, &report.diff_neutral_sad.meta)?;
    write_json(out, SAD_GRAPH, &report.diff_neutral_sad.graph)?;
    write_json(out, HAPPY_META, &report.diff_neutral_happy.meta)?;
    write_json(out, HAPPY_GRAPH, &report.diff_neutral_happy.graph)?;
    write_json(out, AUTOMATON, &report.automaton)?;
    write_json(out, TURING_MACHINE, &report.turing_machine)?;

    let summary = report.summary();
    write_json(out, SUMMARY, &summary)?;
    print_json(&summary, true)
}

#[derive(Serialize)]
struct DecideReport {
    #[serde(rename = "neutral->sad")]
    sad: VectorDecision,
    #[serde(rename = "neutral->happy")]
    happy: VectorDecision,
}

fn cmd_decide(dir: &Path) -> Result<(), FaceCliError> {
    let sad = read_meta(dir, SAD_META)?;
    let happy = read_meta(dir, HAPPY_META)?;

    let report = DecideReport {
        sad: decide_values(&sad.binary),
        happy: decide_values(&happy.binary),
    };
    print_json(&report, true)
}

fn cmd_inspect(
    dir: &Path,
    neutral: &Path,
    top_k: usize,
    config: Option<&Path>,
) -> Result<(), FaceCliError> {
    let config = load_config(config, None)?;
    let landmarks = LandmarkFileExtractor
        .extract(neutral)?
        .ok_or_else(|| AnalysisError::NoFaceDetected("neutral".to_string()))?;
    let regions = map_regions(&landmarks, None, config.banding)?;

    let mut summaries: BTreeMap<&str, DiffSummary> = BTreeMap::new();
    for (transition, file) in [("neutral->sad", SAD_META), ("neutral->happy", HAPPY_META)] {
        let meta = read_meta(dir, file)?.into_meta()?;
        if meta.binary.len() != landmarks.len() {
            return Err(AnalysisError::ShapeMismatch {
                neutral: landmarks.len(),
                target: meta.binary.len(),
            }
            .into());
        }
        summaries.insert(transition, summarize_meta(&meta, &regions, top_k));
    }
    print_json(&summaries, true)
}

#[derive(Serialize)]
struct TraceStep {
    step: usize,
    state: String,
    head: i64,
    symbol: char,
    tape: String,
}

#[derive(Serialize)]
struct SimulationReport {
    final_state: String,
    steps: usize,
    halted: bool,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<Vec<TraceStep>>,
}

fn cmd_simulate(path: &Path, input: &str, max_steps: usize, trace: bool) -> Result<(), FaceCliError> {
    let mut machine = TuringMachine::from_spec_json(&fs::read_to_string(path)?)?;
    machine.reset(input);

    let (final_state, steps, trace) = if trace {
        let mut record = Vec::new();
        while !machine.is_halted() && record.len() < max_steps {
            let info = machine.step();
            record.push(TraceStep {
                step: record.len() + 1,
                state: info.state,
                head: info.head,
                symbol: info.symbol,
                tape: machine.tape_window(10).0,
            });
        }
        (machine.state().to_string(), record.len(), Some(record))
    } else {
        let (state, steps) = machine.run(max_steps);
        (state, steps, None)
    };

    if !machine.is_halted() {
        tracing::warn!(max_steps, "machine did not halt within the step budget");
    }

    print_json(
        &SimulationReport {
            final_state,
            steps,
            halted: machine.is_halted(),
            accepted: machine.is_accepted(),
            trace,
        },
        true,
    )
}

fn cmd_majority(length: usize, dot: bool) -> Result<(), FaceCliError> {
    let machine = majority_machine(length)?;
    if dot {
        println!("{}", machine.to_dot());
        Ok(())
    } else {
        print_json(machine.spec(), true)
    }
}

// Error types

#[derive(Debug)]
enum FaceCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    MissingArtifact(PathBuf, io::Error),
}

impl From<io::Error> for FaceCliError {
    fn from(e: io::Error) -> Self {
        FaceCliError::Io(e)
    }
}

impl From<AnalysisError> for FaceCliError {
    fn from(e: AnalysisError) -> Self {
        FaceCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for FaceCliError {
    fn from(e: serde_json::Error) -> Self {
        FaceCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FaceCliError> for CliError {
    fn from(e: FaceCliError) -> Self {
        match e {
            FaceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FaceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FaceCliError::MissingArtifact(path, e) => CliError {
                code: "MISSING_ARTIFACT".to_string(),
                message: format!("{}: {}", path.display(), e),
                hint: Some("Run 'facestate generate' into this directory first".to_string()),
            },
            FaceCliError::Analysis(e) => {
                let (code, hint) = match &e {
                    AnalysisError::NoFaceDetected(_) => (
                        "NO_FACE",
                        "Check that the detector found a face in every image",
                    ),
                    AnalysisError::ShapeMismatch { .. } => (
                        "LANDMARK_COUNT_MISMATCH",
                        "Use landmarks from the same extractor for every image",
                    ),
                    AnalysisError::FileNotReadable(_) => {
                        ("FILE_NOT_READABLE", "Check file paths and permissions")
                    }
                    AnalysisError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Thresholds must be finite and positive")
                    }
                    AnalysisError::ParseError(_) | AnalysisError::JsonError(_) => (
                        "PARSE_ERROR",
                        "Landmarks must be a JSON point array or an OpenFace CSV",
                    ),
                    AnalysisError::MachineError(_) => {
                        ("INVALID_MACHINE", "Check the machine's states and transitions")
                    }
                    AnalysisError::InvalidSymbol { .. } | AnalysisError::EmptyLandmarks => {
                        ("ANALYSIS_ERROR", "Check input vectors")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}
