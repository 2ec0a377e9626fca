use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use birdseye::pipeline::{
    CornerDetector, CornerSet, FrameBudget, FrameLoop, FrameStatus, NeverStop, PatternSize,
    Presentation, Rectifier, RectifyParams, SinkError, StopSignal,
};
use birdseye::{render_presentation, ImageSequenceSource, ImageView, RecordedCorners};
use clap::Parser;
use log::LevelFilter;

/// Rectify a chessboard plane in every frame of an image sequence.
#[derive(Debug, Parser)]
#[command(name = "birdseye", version, about = "Bird's-eye rectification of a chessboard plane")]
struct Args {
    /// Directory of frames (png, jpg, jpeg, bmp), played in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Recorded corners (JSON) replayed instead of running a detector.
    #[arg(long)]
    corners: Option<PathBuf>,

    /// JSON rectification parameters. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many frames have been presented.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Write annotated source and rectified images here.
    #[arg(long)]
    save_dir: Option<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,

    /// Emit JSON log events.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

enum Detector {
    Recorded(RecordedCorners),
    #[cfg(feature = "chess")]
    Chess(birdseye::detect::ChessboardCornerDetector),
}

impl CornerDetector for Detector {
    fn detect(&mut self, frame: &ImageView<'_>, pattern: PatternSize) -> Option<CornerSet> {
        match self {
            Detector::Recorded(d) => d.detect(frame, pattern),
            #[cfg(feature = "chess")]
            Detector::Chess(d) => d.detect(frame, pattern),
        }
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

fn make_detector(corners: Option<&Path>, _pattern: PatternSize) -> Result<Detector, Box<dyn Error>> {
    if let Some(path) = corners {
        return Ok(Detector::Recorded(RecordedCorners::load(path)?));
    }
    #[cfg(feature = "chess")]
    {
        Ok(Detector::Chess(
            birdseye::detect::ChessboardCornerDetector::for_pattern(_pattern),
        ))
    }
    #[cfg(not(feature = "chess"))]
    {
        Err("no corner detector available: pass --corners or build with feature `chess`".into())
    }
}

fn status_name(status: FrameStatus) -> &'static str {
    match status {
        FrameStatus::Rectified => "rectified",
        FrameStatus::PatternNotFound => "pattern_not_found",
        FrameStatus::Degenerate => "degenerate",
    }
}

fn frame_record(p: &Presentation) -> serde_json::Value {
    let rectified = p.rectified.as_ref();
    let projected: Option<Vec<Option<[f32; 2]>>> = rectified.map(|out| {
        out.projected
            .iter()
            .map(|r| r.as_ref().ok().map(|pt| [pt.x, pt.y]))
            .collect()
    });
    serde_json::json!({
        "frame": p.index,
        "status": status_name(p.status),
        "projected": projected,
        "forward_residual_px": rectified.map(|out| out.forward_residual_px),
        "inliers": rectified.map(|out| out.inliers.iter().filter(|&&b| b).count()),
        "error": p.error.as_ref().map(|e| e.to_string()),
    })
}

fn save_rendered(dir: &Path, p: &Presentation) -> Result<(), SinkError> {
    let rendered = render_presentation(p)
        .ok_or_else(|| SinkError::Other(format!("frame {} cannot be rendered", p.index)))?;
    let save = |img: &image::RgbImage, name: String| {
        img.save(dir.join(name))
            .map_err(|e| SinkError::Other(e.to_string()))
    };
    save(&rendered.source, format!("frame_{:05}.png", p.index))?;
    if let Some(rect) = &rendered.rectified {
        save(rect, format!("rectified_{:05}.png", p.index))?;
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "tracing")]
    {
        birdseye::core::init_tracing(args.json_logs, args.log_level);
    }
    #[cfg(not(feature = "tracing"))]
    birdseye::core::init_with_level(args.log_level)?;
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let params = match &args.config {
        Some(path) => load_json_file::<RectifyParams>(path)?,
        None => RectifyParams::default(),
    };
    let rectifier = Rectifier::new(params)?;
    let detector = make_detector(args.corners.as_deref(), rectifier.params().pattern)?;

    if let Some(dir) = &args.save_dir {
        fs::create_dir_all(dir)?;
    }

    let stdout = std::io::stdout();
    let save_dir = args.save_dir.clone();
    let sink = move |p: &Presentation| -> Result<(), SinkError> {
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &frame_record(p)).map_err(std::io::Error::from)?;
        writeln!(out)?;
        if let Some(dir) = &save_dir {
            save_rendered(dir, p)?;
        }
        Ok(())
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let flag = Arc::clone(&interrupted);
        move || flag.store(true, Ordering::Relaxed)
    })?;

    let with_budget;
    let unbounded;
    let stop: &dyn StopSignal = match args.max_frames {
        Some(n) => {
            with_budget = (interrupted, FrameBudget::new(n));
            &with_budget
        }
        None => {
            unbounded = (interrupted, NeverStop);
            &unbounded
        }
    };

    let source = ImageSequenceSource::new(&args.frames);
    let summary = FrameLoop::new(source, detector, sink, rectifier).run(stop)?;
    log::info!("{summary:?}");
    Ok(())
}
