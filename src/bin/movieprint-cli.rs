use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use image::Rgb;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use movieprint::{
    ExtractOptions, ExtractionPlan, FfmpegDecoder, FfmpegLogLevel, FrameFormat, GridShape,
    HeaderOptions, IntervalStep, LayoutSpec, MoviePrinter, OutputFormat, OutputOptions,
    OverlayAnchor, OverlayContent, OverlayOptions, ProgressCallback, ProgressInfo, Rotation,
    ShotBoundaries, Styling, ToneMapAlgorithm, ToneMapping, VideoSource, WorkingStorage,
};

#[cfg(feature = "hardware")]
use movieprint::HardwareDevice;

const CLI_AFTER_HELP: &str = "Examples:\n  movieprint probe input.mp4 --json\n  movieprint print input.mp4 --out print.jpg --interval 30 --columns 5\n  movieprint print input.mp4 --out print.png --cuts 0:12,0:47,1:30 --timeline 120 --width 1600\n  movieprint plan input.mp4 --interval-frames 240 --max-frames 24\n  movieprint completions zsh > _movieprint";

#[derive(Debug, Parser)]
#[command(
    name = "movieprint",
    version,
    about = "Create movie prints (thumbnail sheets) from video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while extracting.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Worker thread count (0 = automatic).
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,
}

#[derive(Debug, Args, Clone, Default)]
struct PlanArgs {
    /// Seconds between samples.
    #[arg(long)]
    interval: Option<f64>,

    /// Frames between samples (ignored when --interval is given).
    #[arg(long)]
    interval_frames: Option<u64>,

    /// Comma-separated cut instants; switches to one frame per shot.
    #[arg(long)]
    cuts: Option<String>,

    /// Start of the sampled range.
    #[arg(long)]
    start: Option<String>,

    /// End of the sampled range (exclusive).
    #[arg(long)]
    end: Option<String>,

    /// Keep at most this many frames, evenly spread.
    #[arg(long, default_value_t = 0)]
    max_frames: usize,

    /// Comma-separated frame numbers to skip (interval mode).
    #[arg(long)]
    exclude_frames: Option<String>,

    /// Comma-separated 1-based shot numbers to skip (shot mode).
    #[arg(long)]
    exclude_shots: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print source properties (alias: info).
    #[command(
        about = "Print video properties",
        visible_alias = "info",
        after_help = "Examples:\n  movieprint probe input.mp4\n  movieprint probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the instants a print would sample, without decoding.
    #[command(
        about = "Show planned sample instants",
        after_help = "Examples:\n  movieprint plan input.mp4 --interval 10\n  movieprint plan input.mp4 --cuts 0:05,0:20 --json"
    )]
    Plan {
        /// Input video path.
        input: PathBuf,

        #[command(flatten)]
        plan: PlanArgs,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render a movie print.
    #[command(
        about = "Render a movie print",
        after_help = "Examples:\n  movieprint print input.mp4 --out print.jpg --interval 30 --columns 5 --overlay timecode\n  movieprint print input.mp4 --out print.jpg --max-frames 20 --fit 1920x1080 --max-size-kb 500"
    )]
    Print(Box<PrintArgs>),

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct PrintArgs {
    /// Input video path.
    input: PathBuf,

    /// Output image (.jpg or .png).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    plan: PlanArgs,

    /// Grid columns.
    #[arg(long)]
    columns: Option<u32>,

    /// Grid rows (columns are derived).
    #[arg(long)]
    rows: Option<u32>,

    /// Thumbnail width in a grid.
    #[arg(long)]
    thumb_width: Option<u32>,

    /// Timeline layout with this row height.
    #[arg(long)]
    timeline: Option<u32>,

    /// Timeline output width.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Fit the print into WIDTHxHEIGHT.
    #[arg(long)]
    fit: Option<String>,

    /// Gap between cells.
    #[arg(long, default_value_t = 5)]
    padding: u32,

    /// Extra outer margin.
    #[arg(long, default_value_t = 0)]
    margin: u32,

    /// Background colour (#rrggbb).
    #[arg(long)]
    background: Option<String>,

    /// Corner radius.
    #[arg(long, default_value_t = 0)]
    rounded: u32,

    /// Rotation in degrees (0, 90, 180, 270).
    #[arg(long, default_value_t = 0)]
    rotate: u32,

    /// Overlay per cell: timecode | frame.
    #[arg(long)]
    overlay: Option<String>,

    /// Overlay corner: top-left | top-right | bottom-left | bottom-right.
    #[arg(long)]
    overlay_anchor: Option<String>,

    /// Draw a header bar with file information.
    #[arg(long)]
    header: bool,

    /// Output format (jpeg, png); defaults to the --out extension.
    #[arg(long)]
    format: Option<String>,

    /// JPEG quality.
    #[arg(long, default_value_t = 95)]
    quality: u8,

    /// Reduce quality until the file is at most this many KB.
    #[arg(long)]
    max_size_kb: Option<u64>,

    /// Fail when --max-size-kb cannot be met.
    #[arg(long)]
    strict_size: bool,

    /// Write a JSON sidecar next to the print.
    #[arg(long)]
    sidecar: bool,

    /// Tone-mapping curve for HDR input (hable, reinhard, mobius).
    #[arg(long)]
    tone_map: Option<String>,

    /// Keep HDR frames un-tone-mapped.
    #[arg(long)]
    no_tone_map: bool,

    /// Request hardware decoding (optionally a device: cuda, vaapi, d3d11va, videotoolbox, qsv).
    #[arg(long, num_args = 0..=1, default_missing_value = "auto")]
    hardware: Option<String>,

    /// Per-frame decode timeout in seconds (0 disables).
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Spill decoded frames to this directory instead of memory.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// File format of spilled frames (png, jpg).
    #[arg(long, default_value = "png")]
    frame_format: String,

    /// Downscale decoded frames to this longest edge.
    #[arg(long)]
    max_dimension: Option<u32>,
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, *seconds),
        [hours, minutes, seconds] => (hours.parse::<u64>()?, minutes.parse::<u64>()?, *seconds),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let seconds = seconds.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds)
}

/// Negative values clamp to zero; infinite or oversized ones are rejected.
fn seconds_to_duration(seconds: f64) -> Result<Duration, Box<dyn std::error::Error>> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .map_err(|_| format!("time value out of range: {seconds}").into())
}

fn parse_list<T: std::str::FromStr>(value: &str) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>()
                .map_err(|_| format!("invalid list entry: {item}").into())
        })
        .collect()
}

fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.trim().to_ascii_lowercase().split_once('x').map(|(w, h)| {
        (w.trim().parse::<u32>().ok(), h.trim().parse::<u32>().ok())
    })?;
    Some((width?, height?))
}

fn parse_color(value: &str) -> Option<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

fn parse_overlay(value: &str) -> Option<OverlayContent> {
    match value.trim().to_ascii_lowercase().as_str() {
        "timecode" | "time" => Some(OverlayContent::Timecode),
        "frame" | "frames" | "frame-number" => Some(OverlayContent::FrameNumber),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match &global.log_level {
        Some(level) => {
            let parsed = FfmpegLogLevel::from_name(level)
                .ok_or(format!("unsupported --log-level: {level}"))?;
            movieprint::set_ffmpeg_log_level(parsed);
        }
        None => movieprint::set_ffmpeg_log_level(FfmpegLogLevel::Error),
    }
    Ok(())
}

fn build_plan(
    args: &PlanArgs,
    source: &VideoSource,
) -> Result<(ExtractionPlan, Option<ShotBoundaries>), Box<dyn std::error::Error>> {
    let start = args
        .start
        .as_deref()
        .map(parse_timecode)
        .transpose()?
        .unwrap_or_default();
    let end = args.end.as_deref().map(parse_timecode).transpose()?;

    let (plan, shots) = match &args.cuts {
        Some(cuts) => {
            let cuts = cuts
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(parse_timecode)
                .collect::<Result<Vec<_>, _>>()?;
            let range = start..end.unwrap_or_else(|| source.duration());
            let shots = ShotBoundaries::from_cuts(&cuts, range);
            let mut plan = ExtractionPlan::shots();
            if let Some(excluded) = &args.exclude_shots {
                plan = plan.with_excluded_shots(parse_list::<usize>(excluded)?);
            }
            (plan, Some(shots))
        }
        None => {
            let step = match IntervalStep::from_options(args.interval, args.interval_frames) {
                Ok(step) => step,
                // Neither option given: aim for about twenty frames.
                Err(_) if args.interval.is_none() && args.interval_frames.is_none() => {
                    let span = end.unwrap_or_else(|| source.duration()).saturating_sub(start);
                    IntervalStep::Seconds((span / 20).max(Duration::from_millis(1)))
                }
                Err(error) => return Err(error.into()),
            };
            let mut plan = ExtractionPlan::interval(step);
            if let Some(excluded) = &args.exclude_frames {
                plan = plan.with_excluded_frames(parse_list::<u64>(excluded)?);
            }
            (plan, None)
        }
    };

    Ok((
        plan.with_range(start, end).with_max_frames(args.max_frames),
        shots,
    ))
}

fn build_layout(args: &PrintArgs) -> Result<LayoutSpec, Box<dyn std::error::Error>> {
    let mut layout = match (args.timeline, args.columns, args.rows) {
        (Some(row_height), _, _) => LayoutSpec::timeline(row_height, args.width),
        (None, _, Some(rows)) => LayoutSpec::grid(GridShape::Rows(rows)),
        (None, Some(columns), None) => LayoutSpec::grid(GridShape::Columns(columns)),
        (None, None, None) => LayoutSpec::grid(GridShape::Columns(4)),
    };
    if let Some(width) = args.thumb_width {
        layout = layout.with_thumbnail_width(width);
    }
    if let Some(fit) = &args.fit {
        let (width, height) = parse_size(fit).ok_or(format!("invalid --fit size: {fit}"))?;
        layout = layout.with_fit(width, height);
    }
    Ok(layout.with_padding(args.padding).with_margin(args.margin))
}

fn build_styling(args: &PrintArgs) -> Result<Styling, Box<dyn std::error::Error>> {
    let rotation = Rotation::from_degrees(args.rotate)
        .ok_or(format!("unsupported --rotate: {}", args.rotate))?;
    let mut styling = Styling::new()
        .with_rotation(rotation)
        .with_corner_radius(args.rounded);
    if let Some(background) = &args.background {
        let color = parse_color(background).ok_or(format!("invalid --background: {background}"))?;
        styling = styling.with_background(color);
    }
    if let Some(overlay) = &args.overlay {
        let content = parse_overlay(overlay).ok_or(format!("unsupported --overlay: {overlay}"))?;
        let mut options = OverlayOptions::new(content);
        if let Some(anchor) = &args.overlay_anchor {
            let anchor = OverlayAnchor::from_name(anchor)
                .ok_or(format!("unsupported --overlay-anchor: {anchor}"))?;
            options = options.with_anchor(anchor);
        }
        styling = styling.with_overlay(options);
    }
    if args.header {
        styling = styling.with_header(HeaderOptions::default());
    }
    Ok(styling)
}

fn build_output(args: &PrintArgs) -> Result<OutputOptions, Box<dyn std::error::Error>> {
    let format = match &args.format {
        Some(name) => OutputFormat::from_name(name).ok_or(format!("unsupported --format: {name}"))?,
        None => OutputFormat::from_path(&args.out).unwrap_or_default(),
    };
    let mut output = OutputOptions::new(format)
        .with_quality(args.quality)
        .with_required_size_target(args.strict_size);
    if let Some(max_size_kb) = args.max_size_kb {
        output = output.with_max_size_kb(max_size_kb);
    }
    if args.sidecar {
        output = output.with_sidecar(args.out.with_extension("json"));
    }
    Ok(output)
}

fn build_extract_options(
    args: &PrintArgs,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    let timeout = if args.timeout > 0.0 {
        Some(seconds_to_duration(args.timeout)?)
    } else {
        None
    };
    let mut options = ExtractOptions::new()
        .with_decode_timeout(timeout)
        .with_max_dimension(args.max_dimension)
        .with_hardware(args.hardware.is_some());

    if args.no_tone_map {
        options = options.with_tone_mapping(ToneMapping {
            enabled: false,
            ..ToneMapping::default()
        });
    } else if let Some(name) = &args.tone_map {
        let algorithm =
            ToneMapAlgorithm::from_name(name).ok_or(format!("unsupported --tone-map: {name}"))?;
        options = options.with_tone_map_algorithm(algorithm);
    }
    if let Some(directory) = &args.temp_dir {
        let format = FrameFormat::from_name(&args.frame_format)
            .ok_or_else(|| format!("unknown frame format: {}", args.frame_format))?;
        options = options
            .with_working_storage(WorkingStorage::Directory(directory.clone()))
            .with_frame_format(format);
    }
    if let Some(progress) = progress {
        options = options.with_progress(progress);
    }
    Ok(options)
}

fn build_decoder(args: &PrintArgs) -> Result<FfmpegDecoder, Box<dyn std::error::Error>> {
    #[cfg(feature = "hardware")]
    if let Some(name) = args.hardware.as_deref().filter(|name| *name != "auto") {
        let device =
            HardwareDevice::from_name(name).ok_or(format!("unsupported --hardware device: {name}"))?;
        return Ok(FfmpegDecoder::new().with_hardware_device(device));
    }

    #[cfg(not(feature = "hardware"))]
    if args.hardware.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--hardware requires building with the `hardware` feature; decoding in software"
                .yellow()
        );
    }

    Ok(FfmpegDecoder::new())
}

/// Bridges extraction progress to a terminal progress bar.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(timestamp) = info.current_timestamp {
            self.bar.set_message(format!("{:.1}s", timestamp.as_secs_f64()));
        }
        if info.total.is_some_and(|total| info.current >= total) {
            self.bar.finish_and_clear();
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let source = VideoSource::open(&input, &FfmpegDecoder::new())?;
            let info = source.info();
            if json {
                let payload = json!({
                    "path": source.path().display().to_string(),
                    "duration_seconds": info.duration.as_secs_f64(),
                    "frames_per_second": info.frames_per_second,
                    "width": info.width,
                    "height": info.height,
                    "codec": info.codec,
                    "hdr": info.dynamic_range.is_hdr(),
                    "hardware_decode_available": info.hardware_decode_available,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("File: {}", source.display_name());
                println!("Duration: {:?}", info.duration);
                println!(
                    "Video: {}x{} @ {:.3} fps [{}]",
                    info.width, info.height, info.frames_per_second, info.codec
                );
                println!("Dynamic range: {:?}", info.dynamic_range);
                if info.hardware_decode_available {
                    println!("Hardware decoding: available");
                }
            }
        }
        Commands::Plan { input, plan, json } => {
            let source = VideoSource::open(&input, &FfmpegDecoder::new())?;
            let (extraction_plan, shots) = build_plan(&plan, &source)?;
            let instants = movieprint::plan(&extraction_plan, &source, shots.as_ref())?;
            if json {
                let payload: Vec<_> = instants
                    .iter()
                    .map(|instant| {
                        json!({
                            "slot": instant.sequence_index,
                            "timestamp_seconds": instant.timestamp.as_secs_f64(),
                            "frame_number": instant.frame_number,
                            "shot": instant.shot.map(|shot| shot.number),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for instant in &instants {
                    println!(
                        "{:>4}  {:>12.3}s  frame {}",
                        instant.sequence_index,
                        instant.timestamp.as_secs_f64(),
                        instant.frame_number
                    );
                }
                println!("{} {} instants", "planned".green().bold(), instants.len());
            }
        }
        Commands::Print(args) => {
            ensure_writable_path(&args.out, cli.global.overwrite)?;

            let progress: Option<Arc<dyn ProgressCallback>> = if cli.global.progress {
                Some(Arc::new(TerminalProgress::new()?))
            } else {
                None
            };
            let options = build_extract_options(&args, progress)?;
            let decoder = build_decoder(&args)?;
            let mut printer = MoviePrinter::new(Arc::new(decoder)).with_options(options);
            if cli.global.threads > 0 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(cli.global.threads)
                    .thread_name(|index| format!("movieprint-worker-{index}"))
                    .build()?;
                printer = printer.with_pool(Arc::new(pool));
            }

            let source = printer.open(&args.input)?;
            let (extraction_plan, shots) = build_plan(&args.plan, &source)?;
            let layout = build_layout(&args)?;
            let styling = build_styling(&args)?;
            let output = build_output(&args)?;

            let encoded = printer.render_to_file(
                &source,
                &extraction_plan,
                &layout,
                &styling,
                shots.as_ref(),
                &args.out,
                &output,
            )?;

            println!(
                "{} {} ({}x{}, {:.1} KB)",
                "saved".green().bold(),
                args.out.display(),
                encoded.width,
                encoded.height,
                encoded.size_kb()
            );
            if !encoded.size_target_met {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    "size target not met at the quality floor".yellow()
                );
            }
            if let Some(sidecar) = &output.sidecar {
                println!("{} {}", "saved".green().bold(), sidecar.display());
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "movieprint", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
