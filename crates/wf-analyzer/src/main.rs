#![warn(clippy::all, clippy::dbg_macro)]

use std::{
    fs,
    io::stdout,
    process::ExitCode,
};

use annotate_snippets::{Group, Level, Renderer};
use anstream::{eprintln, println, stderr, stream::IsTerminal};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueEnum};
use clap_verbosity_flag::InfoLevel;
use indicatif::ProgressStyle;
use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::{Span, info_span};
use tracing_indicatif::{IndicatifLayer, span_ext::IndicatifSpanExt as _};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::config::{Config, ConfigError, ConfigErrorInner};
use crate::output::mermaid::Direction;
use crate::registry::input::{InputKey, InputRegistry};
use crate::registry::AnalysisRegistry;
use crate::state::AnalyzerState;
use wf_ir::{AnalysisResult, IdGen, Metadata, WorkflowNode};
use wf_syntax::Document;

mod config;
mod dataflow;
mod diagnostic;
mod diagram;
mod discovery;
mod enrich;
mod errorflow;
mod output;
mod registry;
mod state;
mod walker;

/// Statically analyzes the workflow orchestration DSL.
#[derive(Parser)]
#[command(about, version)]
struct App {
    /// The file or directory to analyze.
    #[arg(required = true)]
    path: Utf8PathBuf,

    /// The artifact format to emit for each analyzed workflow.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Print each workflow's data-flow keys (producers/consumers) to stderr.
    #[arg(long)]
    keys: bool,

    /// The Mermaid flowchart direction.
    #[arg(long, value_enum, default_value_t)]
    direction: Direction,

    /// Also emit a self-contained interactive HTML document.
    #[arg(long)]
    html: bool,

    /// Path to write the HTML document to. Implies --html.
    #[arg(long)]
    html_output: Option<Utf8PathBuf>,

    /// Write each artifact next to its source file instead of stdout.
    #[arg(short = 'o', long)]
    output_adjacent: bool,

    /// Suffix inserted before the extension when writing adjacent output
    /// (e.g. `checkout.<suffix>.mmd`).
    #[arg(long)]
    suffix: Option<String>,

    /// Don't print artifacts to stdout.
    #[arg(long)]
    no_stdout: bool,

    /// Where to write the diagram DSL JSON file: `off`, `.awaitly` (the
    /// default layout under the analyzed root), or an explicit directory.
    #[arg(long, default_value = "off")]
    dsl_output: String,

    /// Force-write the diagram DSL file even if `--dsl-output` wasn't given.
    #[arg(long)]
    write_dsl: bool,

    /// The configuration file to load, overriding discovery.
    #[arg(long, group = "conf")]
    config: Option<Utf8PathBuf>,

    /// Disable all configuration loading.
    #[arg(long, group = "conf")]
    no_config: bool,

    /// Treat every warning-severity diagnostic as an error for exit-code
    /// purposes, regardless of the config file's `warningsAsErrors`.
    #[arg(long)]
    warnings_as_errors: bool,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<InfoLevel>,
}

#[derive(Debug, Default, Copy, Clone, ValueEnum)]
enum OutputFormat {
    #[default]
    Mermaid,
    Json,
    Markdown,
}

#[derive(Debug, Error)]
enum Error {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("no workflows found")]
    NoWorkflows,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Every workflow invocation matched against its definition in one file,
/// walked into IR, enriched, and diagnosed.
fn analyze_file(
    contents: &str,
    state: &AnalyzerState,
    config: &Config,
) -> anyhow::Result<Vec<(AnalysisResult, Vec<diagnostic::Diagnostic>)>> {
    let doc = Document::parse(contents)?;
    if doc.has_errors() {
        tracing::warn!("file contains unparsable syntax; affected subtrees become unknown nodes");
    }

    let tags = discovery::collect_tags_constants(&doc);
    let defs = discovery::collect_definitions(&doc, &tags);
    let known_names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
    let invocations = discovery::collect_invocations(&doc, &known_names);

    let mut results = Vec::new();

    for invocation in invocations {
        let Some(def) = defs.iter().find(|d| d.name == invocation.workflow_name) else {
            continue;
        };

        let mut ids = IdGen::new();
        let mut warnings = Vec::new();
        // The walker's own `cx.stats` bookkeeping only covers a subset of
        // node kinds (it never sees `switch`/`step.branch` decisions or
        // `unknown` nodes); stats are instead derived once, below, from the
        // finished tree so every variant is counted exactly once.
        let mut walk_stats = wf_ir::Stats::default();

        let step_param = first_parameter_name(&doc, invocation.callback).unwrap_or_else(|| "step".into());

        let mut cx = walker::WalkCx {
            doc: &doc,
            step_param,
            known_workflows: &known_names,
            tags: &tags,
            ids: &mut ids,
            warnings: &mut warnings,
            stats: &mut walk_stats,
        };

        let children = walker::walk_callback(&mut cx, invocation.callback);

        let mut root = WorkflowNode {
            workflow_name: def.name.clone(),
            declared_errors: def.declared_errors.clone(),
            strict: def.strict,
            dependencies: def.dependencies.clone(),
            description: def.description.clone(),
            children,
        };

        enrich::enrich(&mut root, state.checker.as_deref());

        let mut stats = wf_ir::Stats::default();
        count_stats(&root, &mut stats);

        let dataflow = dataflow::build(&root);
        let errorflow = errorflow::analyze(&root);

        let mut diagnostics = diagnostic::rules::run(&root, contents, config);
        diagnostics.extend(dataflow_diagnostics(&root, &dataflow));
        diagnostics.extend(errorflow_diagnostics(&root, &errorflow));

        let result = AnalysisResult {
            root,
            metadata: Metadata {
                file_path: String::new(),
                analyzed_at: now_unix(),
                warnings,
                stats,
            },
            references: Default::default(),
        };

        results.push((result, diagnostics));
    }

    Ok(results)
}

fn count_stats(root: &WorkflowNode, stats: &mut wf_ir::Stats) {
    use wf_ir::FlowNode;

    for node in root.children.iter().flat_map(|c| c.walk()) {
        match node {
            FlowNode::Step { .. } | FlowNode::SagaStep { .. } | FlowNode::Stream { .. } => {
                stats.total_steps += 1
            }
            FlowNode::Conditional { .. } | FlowNode::Decision { .. } | FlowNode::Switch { .. } => {
                stats.conditional_count += 1
            }
            FlowNode::Parallel { .. } => stats.parallel_count += 1,
            FlowNode::Race { .. } => stats.race_count += 1,
            FlowNode::Loop { .. } => stats.loop_count += 1,
            FlowNode::WorkflowRef { .. } => stats.workflow_ref_count += 1,
            FlowNode::Unknown { .. } => stats.unknown_count += 1,
            FlowNode::Sequence { .. } => {}
        }
    }
}

/// Every data-flow node key in `root`, mapped back to its source location,
/// so validation issues reported by key name can be attributed to a span.
fn locations_by_key(root: &WorkflowNode) -> std::collections::BTreeMap<String, wf_ir::Span> {
    root.children
        .iter()
        .flat_map(|n| n.walk())
        .filter_map(|node| Some((dataflow::node_key(node)?, dataflow::node_location(node)?)))
        .collect()
}

/// Surfaces §4.5's data-flow validation issues (`undefined-read`,
/// `type-mismatch`) as diagnostics instead of discarding the graph.
fn dataflow_diagnostics(root: &WorkflowNode, graph: &dataflow::DataFlowGraph) -> Vec<diagnostic::Diagnostic> {
    let locations = locations_by_key(root);
    let mut diagnostics = Vec::new();

    for (consumer, key) in &graph.undefined_reads {
        let location = locations.get(consumer).copied().unwrap_or(wf_ir::Span::zero());
        diagnostics.push(diagnostic::Diagnostic::new(
            "undefined-read",
            format!("'{consumer}' reads key '{key}' which no step produces"),
            location,
        ));
    }

    for mismatch in &graph.type_mismatches {
        let location = locations.get(&mismatch.consumer).copied().unwrap_or(wf_ir::Span::zero());
        diagnostics.push(diagnostic::Diagnostic::new(
            "type-mismatch",
            format!(
                "'{consumer}' consumes key '{key}' as '{consumer_type}' but '{producer}' produces '{producer_type}'",
                consumer = mismatch.consumer,
                key = mismatch.key,
                consumer_type = mismatch.consumer_type,
                producer = mismatch.producer,
                producer_type = mismatch.producer_type,
            ),
            location,
        ));
    }

    diagnostics
}

/// Surfaces §4.6's error-flow validation (`undeclaredErrors`) as
/// diagnostics instead of discarding the analysis.
fn errorflow_diagnostics(root: &WorkflowNode, flow: &errorflow::ErrorFlow) -> Vec<diagnostic::Diagnostic> {
    let locations = locations_by_key(root);
    flow.undeclared_errors
        .iter()
        .map(|error| {
            let location = flow
                .error_to_steps
                .get(error)
                .and_then(|steps| steps.first())
                .and_then(|step| locations.get(step))
                .copied()
                .unwrap_or(wf_ir::Span::zero());
            diagnostic::Diagnostic::new(
                "undeclared-error",
                format!("error '{error}' is raised but is not in the workflow's declared error set"),
                location,
            )
        })
        .collect()
}

fn first_parameter_name(doc: &Document, callback: tree_sitter::Node<'_>) -> Option<String> {
    use wf_syntax::NodeExt as _;

    let params = callback.parameters_child()?;
    let first = params.named_children_vec().into_iter().next()?;
    match first.kind() {
        "identifier" => Some(doc.text(first).to_string()),
        _ => None,
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn sanitize_workflow_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

fn adjacent_path(source: &Utf8Path, suffix: Option<&str>, extension: &str) -> Utf8PathBuf {
    let stem = source.file_stem().unwrap_or("workflow");
    let name = match suffix {
        Some(suffix) => format!("{stem}.{suffix}.{extension}"),
        None => format!("{stem}.{extension}"),
    };
    source.with_file_name(name)
}

fn write_artifact(path: &Utf8Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn run(app: &App) -> Result<ExitCode, Error> {
    let config = if app.no_config {
        Config::default()
    } else if let Some(path) = &app.config {
        Config::from_path(path)?
    } else {
        Config::discover(&app.path)?.unwrap_or_default()
    };

    let mut inputs = InputRegistry::new();
    inputs
        .discover(&app.path)
        .map_err(|source| Error::Other(source))?;

    if inputs.is_empty() {
        return Err(Error::NoWorkflows);
    }

    let state = AnalyzerState::default();
    let mut registry = AnalysisRegistry::new();

    {
        let span = info_span!("analyze");
        span.pb_set_length(inputs.len() as u64);
        span.pb_set_style(
            &ProgressStyle::with_template("[{elapsed_precise}] {bar:!30.cyan/blue} {msg}")
                .expect("static progress bar template is valid"),
        );
        let _guard = span.enter();

        for (key, contents) in inputs.iter_inputs() {
            Span::current().pb_set_message(key.filename());
            tracing::debug!("analyzing {key}", key = key.presentation_path());

            let file_results = analyze_file(contents, &state, &config).unwrap_or_else(|err| {
                tracing::warn!("skipping {key}: {err}", key = key.presentation_path());
                Vec::new()
            });

            for (mut result, diagnostics) in file_results {
                result.metadata.file_path = key.presentation_path().to_string();

                if app.keys {
                    print_keys(&result.root, key);
                }

                let diagram = diagram::lower(&result.root);

                emit_artifacts(app, key, &result, &diagram, &diagnostics)?;

                registry.push(key.clone(), contents.clone(), result, diagnostics);
            }

            Span::current().pb_inc(1);
        }
    }

    if matches!(app.format, OutputFormat::Json) && !app.output_adjacent && !app.no_stdout {
        output::json::output(stdout(), &registry, true).map_err(Error::Other)?;
    }

    output::plain::render(&registry);

    let warnings_as_errors = app.warnings_as_errors || config.warnings_as_errors();
    Ok(registry.exit_code(warnings_as_errors))
}

fn print_keys(root: &WorkflowNode, key: &InputKey) {
    let graph = dataflow::build(root);
    eprintln!("{}:", key.presentation_path().bold());
    for edge in &graph.edges {
        eprintln!("  {} --[{}]--> {}", edge.from, edge.key, edge.to);
    }
    for (producer, _) in &graph.undefined_reads {
        eprintln!("  {} (undefined read)", producer.yellow());
    }
}

fn emit_artifacts(
    app: &App,
    key: &InputKey,
    result: &AnalysisResult,
    diagram: &diagram::Diagram,
    diagnostics: &[diagnostic::Diagnostic],
) -> Result<(), Error> {
    let source_path = key.given_path.clone();

    let (artifact_text, extension) = match app.format {
        OutputFormat::Mermaid => (output::mermaid::render(diagram, app.direction), "mmd"),
        OutputFormat::Json => (serde_json::to_string_pretty(result)?, "json"),
        OutputFormat::Markdown => (output::markdown::render(result, diagram, diagnostics), "md"),
    };

    if app.output_adjacent {
        let path = adjacent_path(&source_path, app.suffix.as_deref(), extension);
        write_artifact(&path, &artifact_text).map_err(Error::Other)?;
    } else if !app.no_stdout && !matches!(app.format, OutputFormat::Json) {
        println!("{artifact_text}");
    }

    let want_html = app.html || app.html_output.is_some();
    if want_html {
        let html = output::html::render(result, diagram).map_err(Error::Other)?;
        let path = app
            .html_output
            .clone()
            .unwrap_or_else(|| adjacent_path(&source_path, app.suffix.as_deref(), "html"));
        write_artifact(&path, &html).map_err(Error::Other)?;
    }

    if app.write_dsl || app.dsl_output != "off" {
        let base = match app.dsl_output.as_str() {
            "off" | ".awaitly" => source_root(&source_path).join(".awaitly").join("dsl"),
            custom => Utf8PathBuf::from(custom),
        };
        let filename = format!("{}.dsl.json", sanitize_workflow_name(&result.root.workflow_name));
        let path = base.join(filename.as_str());
        let dsl_json = serde_json::to_string_pretty(diagram)?;
        write_artifact(&path, &dsl_json).map_err(Error::Other)?;
    }

    Ok(())
}

fn source_root(path: &Utf8Path) -> Utf8PathBuf {
    path.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| Utf8PathBuf::from("."))
}

fn main() -> ExitCode {
    human_panic::setup_panic!();

    let app = App::parse();

    let color_mode = if std::env::var("NO_COLOR").is_ok() {
        anstream::ColorChoice::Never
    } else if !stderr().is_terminal() {
        anstream::ColorChoice::Never
    } else {
        anstream::ColorChoice::Auto
    };
    anstream::ColorChoice::write_global(color_mode);

    let filter = EnvFilter::builder()
        .with_default_directive(app.verbose.tracing_level_filter().into())
        .from_env()
        .expect("failed to parse RUST_LOG");

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(filter)
        .with(indicatif_layer)
        .init();

    match run(&app) {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!("{fatal}: {err}", fatal = "fatal".red().bold());

            if let Error::Config(ConfigError { source: ConfigErrorInner::Syntax(_), .. }) = &err {
                let group = Group::with_title(Level::ERROR.primary_title(err.to_string()))
                    .element(Level::HELP.message("check your .awaitly-analyzer.yml for syntax errors"));
                let renderer = Renderer::styled();
                eprintln!("{}", renderer.render(&[group]));
            }

            ExitCode::FAILURE
        }
    }
}
