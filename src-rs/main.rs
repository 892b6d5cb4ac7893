use anyhow::{bail, Context, Result};
use case_annotate::engine::SequentialIds;
use case_annotate::store::{ensure_parent_dir, write_json_pretty};
use case_annotate::{
    AnnotationEngine, AnnotationSet, AnnotationStore, ElementBounds, EngineConfig, EngineError,
    FileImageSource, Geometry, ImageRef, JsonFileStore, MappingMode, Point, Renderer, TextInput,
    Tool, Transition,
};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENTS_HELP: &str = r##"Event script JSON:
{
  "bounds": {"left": 0, "top": 0, "width": 400, "height": 300},
  "events": [
    {"type": "color", "color": "#FF0000"},
    {"type": "down", "x": 10, "y": 10},
    {"type": "move", "x": 10, "y": 50},
    {"type": "move", "x": 50, "y": 50},
    {"type": "up"},
    {"type": "tool", "tool": "text"},
    {"type": "click", "x": 100, "y": 100},
    {"type": "text", "value": "NPDR"}
  ]
}

Notes:
- x/y are viewport coordinates; bounds is the on-screen box of the image element
  (default: the image at its intrinsic size at the origin).
- "leave" ends a drag that left the surface; the captured path is committed.
- a pending text request is answered by the next "text" or "cancel" event, or
  from stdin when --prompt is set.
"##;

#[derive(Parser, Debug)]
#[command(
    name = "case-annotate",
    version,
    about = "Freehand and text annotation of clinical case images"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Render an annotation set onto its base image
    Render(RenderArgs),
    /// Drive the annotation engine with a scripted pointer log
    Replay(ReplayArgs),
    /// Summarize an annotation set and report malformed records
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
struct StyleArgs {
    /// Stroke width in image pixels
    #[arg(long)]
    stroke_width: Option<f64>,
    /// Text size in pixels (rounded to a multiple of 8)
    #[arg(long)]
    font_px: Option<u32>,
    /// Screen-to-image mapping: intrinsic or scaled
    #[arg(long)]
    mapping: Option<MappingMode>,
}

impl StyleArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(width) = self.stroke_width.filter(|w| w.is_finite() && *w > 0.0) {
            config.stroke_width = width;
        }
        if let Some(px) = self.font_px {
            config.font_px = px.max(8);
        }
        if let Some(mapping) = self.mapping {
            config.mapping = mapping;
        }
        config
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Base image path
    input: PathBuf,
    /// Output PNG path
    output: PathBuf,
    /// Annotation set JSON (bare array or store sidecar), or - for stdin
    #[arg(long)]
    annotations: String,
    /// Path to write render metadata (default: <output>.json)
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Disable metadata sidecar output
    #[arg(long, action = ArgAction::SetTrue)]
    no_meta: bool,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Base image path
    input: PathBuf,
    /// Event script JSON path (or - for stdin)
    #[arg(long, required_unless_present = "events_help")]
    events: Option<String>,
    /// Annotation store sidecar; created on first commit
    #[arg(long, required_unless_present = "events_help")]
    store: Option<PathBuf>,
    /// Author recorded on new annotations
    #[arg(long, default_value = "demo")]
    user: String,
    /// Initial annotation color
    #[arg(long)]
    color: Option<String>,
    /// Use sequential ids with this prefix instead of random ones
    #[arg(long)]
    id_prefix: Option<String>,
    /// Write the final composite to this PNG path
    #[arg(long)]
    out: Option<PathBuf>,
    /// Answer pending text requests from stdin
    #[arg(long, action = ArgAction::SetTrue)]
    prompt: bool,
    /// Print event script schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    events_help: bool,
    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Annotation set JSON (bare array or store sidecar), or - for stdin
    path: String,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    bounds: Option<ElementBounds>,
    events: Vec<ScriptEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ScriptEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Leave,
    Click { x: f64, y: f64 },
    Tool { tool: Tool },
    Color { color: String },
    Text { value: String },
    Cancel,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "case_annotate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Render(args) => command_render(args),
        Commands::Replay(args) => command_replay(args),
        Commands::Inspect(args) => command_inspect(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "render",
            "description": "Render an annotation set onto its base image and write PNG + metadata."
        }),
        json!({
            "name": "replay",
            "description": "Feed a pointer event script through the annotation engine and persist commits."
        }),
        json!({
            "name": "inspect",
            "description": "Summarize an annotation set and list malformed records."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_render(args: RenderArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }

    let raw = read_source(&args.annotations)?;
    let (set, rejected) =
        AnnotationSet::from_json_lenient(&raw).context("invalid annotation set JSON")?;
    for record in &rejected {
        tracing::warn!(index = record.index, id = ?record.id, reason = %record.reason, "dropping undecodable record");
    }

    let base = image::open(&args.input)
        .with_context(|| format!("failed to open input image: {}", args.input.display()))?;
    let (img_w, img_h) = (base.width(), base.height());
    let renderer = Renderer::from_config(&args.style.config());
    let composite = renderer.render(&base, set.as_slice(), None);

    ensure_parent_dir(&args.output)?;
    DynamicImage::ImageRgba8(composite.image)
        .save(&args.output)
        .with_context(|| format!("failed to save output image: {}", args.output.display()))?;

    if !args.no_meta {
        let meta_path = args
            .meta_out
            .clone()
            .unwrap_or_else(|| default_sidecar_for(&args.output));

        let payload = json!({
            "composite_meta_version": 1,
            "input_path": abs_path(&args.input).display().to_string(),
            "output_path": abs_path(&args.output).display().to_string(),
            "meta_path": abs_path(&meta_path).display().to_string(),
            "generated_at": timestamp_iso(),
            "size": {"width": img_w, "height": img_h, "units": "px"},
            "annotation_count": set.len(),
            "skipped": composite.skipped,
            "rejected": rejected,
        });

        write_json_pretty(&meta_path, &payload)?;
    }

    println!("{}", abs_path(&args.output).display());
    Ok(())
}

fn command_replay(args: ReplayArgs) -> Result<()> {
    if args.events_help {
        println!("{}", EVENTS_HELP.trim());
        return Ok(());
    }
    let (Some(events_path), Some(store_path)) = (args.events.as_deref(), args.store.as_ref())
    else {
        bail!("--events and --store are required");
    };

    let size = case_annotate::source::probe_size(&args.input)?;
    let script: Script = serde_json::from_str(&read_source(events_path)?)
        .context("invalid event script JSON")?;
    let bounds = script
        .bounds
        .unwrap_or_else(|| ElementBounds::at_intrinsic(0.0, 0.0, size));

    let image = ImageRef::new(abs_path(&args.input).display().to_string(), size);
    let store = JsonFileStore::open(store_path)?.with_image(image.clone());
    let before = store.list().len();

    let mut engine = AnnotationEngine::new(store, image, args.user.clone(), args.style.config());
    if let Some(prefix) = args.id_prefix.as_deref() {
        engine = engine.with_ids(SequentialIds::new(prefix));
    }
    engine.load_image(&FileImageSource::new())?;
    if let Some(color) = args.color.as_deref() {
        engine.set_color(color)?;
    }

    let mut committed = 0usize;
    let mut refused = 0usize;
    let stdin = io::stdin();
    for (index, event) in script.events.into_iter().enumerate() {
        let outcome = apply_event(&mut engine, event, bounds);
        let outcome = match outcome {
            Ok(Transition::TextRequested(request)) if args.prompt => {
                eprint!("annotation text at ({}, {}): ", request.anchor.x, request.anchor.y);
                let mut line = String::new();
                let read = stdin.lock().read_line(&mut line)?;
                let input = if read == 0 {
                    TextInput::Cancelled
                } else {
                    TextInput::Value(line.trim_end_matches(['\r', '\n']).to_string())
                };
                engine.provide_text(input)
            }
            other => other,
        };

        match outcome {
            Ok(Transition::Committed(annotation)) => {
                committed += 1;
                tracing::debug!(index, id = %annotation.id, "event committed annotation");
            }
            Ok(_) => {}
            Err(EngineError::Resource(err)) => {
                return Err(err).with_context(|| format!("event {index} failed"));
            }
            Err(err) => {
                refused += 1;
                tracing::warn!(index, error = %err, "event refused");
            }
        }
    }

    if let Some(request) = engine.pending_text() {
        tracing::warn!(x = request.anchor.x, y = request.anchor.y, "script ended with an unanswered text request");
    }

    if let Some(out) = args.out.as_ref() {
        let composite = engine.render()?;
        ensure_parent_dir(out)?;
        DynamicImage::ImageRgba8(composite.image)
            .save(out)
            .with_context(|| format!("failed to save composite: {}", out.display()))?;
    }

    let total = engine.annotations().len();
    let summary = json!({
        "store": abs_path(store_path).display().to_string(),
        "previous": before,
        "committed": committed,
        "refused": refused,
        "total": total,
        "output": args.out.as_ref().map(|p| abs_path(p).display().to_string()),
    });
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn apply_event<S: AnnotationStore>(
    engine: &mut AnnotationEngine<S>,
    event: ScriptEvent,
    bounds: ElementBounds,
) -> Result<Transition, EngineError> {
    match event {
        ScriptEvent::Down { x, y } => engine.pointer_down(Point::new(x, y), bounds),
        ScriptEvent::Move { x, y } => engine.pointer_move(Point::new(x, y), bounds),
        ScriptEvent::Up => engine.pointer_up(),
        ScriptEvent::Leave => engine.pointer_leave(),
        ScriptEvent::Click { x, y } => engine.click(Point::new(x, y), bounds),
        ScriptEvent::Tool { tool } => engine.set_tool(tool).map(|_| Transition::Ignored),
        ScriptEvent::Color { color } => engine.set_color(&color).map(|_| Transition::Ignored),
        ScriptEvent::Text { value } => engine.provide_text(TextInput::Value(value)),
        ScriptEvent::Cancel => engine.provide_text(TextInput::Cancelled),
    }
}

fn command_inspect(args: InspectArgs) -> Result<()> {
    let raw = read_source(&args.path)?;
    let (set, rejected) =
        AnnotationSet::from_json_lenient(&raw).context("invalid annotation set JSON")?;

    let mut strokes = 0usize;
    let mut texts = 0usize;
    let mut authors: BTreeMap<&str, usize> = BTreeMap::new();
    let mut invalid: Vec<Value> = Vec::new();
    for (index, annotation) in set.iter().enumerate() {
        match annotation.geometry {
            Geometry::Stroke(_) => strokes += 1,
            Geometry::Text(_) => texts += 1,
        }
        *authors.entry(annotation.created_by.as_str()).or_default() += 1;
        if let Err(err) = annotation.validate() {
            invalid.push(json!({"index": index, "id": annotation.id, "reason": err.to_string()}));
        }
    }

    let payload = json!({
        "count": set.len(),
        "strokes": strokes,
        "texts": texts,
        "authors": authors,
        "first_created_at": set.iter().map(|a| a.created_at).min(),
        "last_created_at": set.iter().map(|a| a.created_at).max(),
        "invalid": invalid,
        "rejected": rejected,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn read_source(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read JSON from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read file: {path}"))
}

fn default_sidecar_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.json"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use case_annotate::{ImageSize, MemoryStore};
    use image::{Rgba, RgbaImage};

    #[test]
    fn script_events_decode_from_json() {
        let raw = r##"{
            "events": [
                {"type": "down", "x": 1, "y": 2},
                {"type": "tool", "tool": "text"},
                {"type": "color", "color": "#00FF00"},
                {"type": "cancel"}
            ]
        }"##;
        let script: Script = serde_json::from_str(raw).unwrap();
        assert!(script.bounds.is_none());
        assert_eq!(script.events.len(), 4);
        assert!(matches!(script.events[1], ScriptEvent::Tool { tool: Tool::Text }));
    }

    #[test]
    fn scripted_events_drive_the_engine() {
        let size = ImageSize::new(60, 40);
        let mut engine = AnnotationEngine::new(
            MemoryStore::new(),
            ImageRef::new("mem", size),
            "demo",
            EngineConfig::default(),
        );
        engine
            .set_base_image(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                60,
                40,
                Rgba([0, 0, 0, 255]),
            )))
            .unwrap();
        let bounds = ElementBounds::at_intrinsic(0.0, 0.0, size);
        let events = vec![
            ScriptEvent::Down { x: 1.0, y: 1.0 },
            ScriptEvent::Move { x: 20.0, y: 1.0 },
            ScriptEvent::Up,
            ScriptEvent::Tool { tool: Tool::Text },
            ScriptEvent::Click { x: 5.0, y: 30.0 },
            ScriptEvent::Text {
                value: "OD".to_string(),
            },
        ];
        for event in events {
            apply_event(&mut engine, event, bounds).unwrap();
        }
        assert_eq!(engine.annotations().len(), 2);
    }

    #[test]
    fn default_sidecar_replaces_extension() {
        assert_eq!(
            default_sidecar_for(Path::new("out/composite.png")),
            PathBuf::from("out/composite.json")
        );
    }
}
