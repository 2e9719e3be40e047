mod capture;
mod output;

use anyhow::{anyhow, Context, Result};
use backdrop::background::ResizeMode;
use backdrop::config::{
    BackgroundConfig, DenseClassifierConfig, DetectorConfig, PipelineConfig, SegmenterConfig,
    WeightsConfig, DEFAULT_DENSE_MODEL_URL, DEFAULT_WEIGHTS_DIR,
};
use backdrop::segmentation::MaskEncoding;
use backdrop::FramePipeline;
use capture::{CameraConfig, CaptureSource, WebcamCapture};
use clap::Parser;
use image::Rgb;
use output::{LoopbackSink, OutputSink};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Segmentation backend: detector, dense-classifier (aliases: yolo, mediapipe)
    #[arg(long, default_value = "dense-classifier")]
    backend: String,

    /// Model weights for the selected backend
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory holding (and receiving downloaded) weights
    #[arg(long, default_value = DEFAULT_WEIGHTS_DIR)]
    weights_dir: PathBuf,

    /// Remote asset fetched when the dense classifier has no local weights
    #[arg(long, default_value = DEFAULT_DENSE_MODEL_URL)]
    model_url: String,

    /// Detector class ids kept as foreground
    #[arg(long, value_delimiter = ',', default_value = "0")]
    classes: Vec<u32>,

    /// Detector confidence threshold
    #[arg(long, default_value_t = 0.25)]
    confidence: f32,

    /// Detector mask encoding: binary or categorical
    #[arg(long, default_value = "binary")]
    mask_encoding: MaskEncoding,

    /// Solid background color as R,G,B
    #[arg(long, default_value = "0,0,0", value_parser = parse_color)]
    background_color: Rgb<u8>,

    /// Background image; overrides --background-color
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// How the background image is fitted: stretch or fill
    #[arg(long, default_value = "stretch")]
    resize_mode: String,

    /// Output the mask instead of the composite
    #[arg(long)]
    show_mask: bool,

    /// Stop at the first frame that fails to process instead of skipping it
    #[arg(long)]
    stop_on_error: bool,
}

fn parse_color(value: &str) -> std::result::Result<Rgb<u8>, String> {
    let channels = value
        .split(',')
        .map(|c| c.trim().parse::<u8>().map_err(|e| format!("bad channel '{c}': {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match channels.as_slice() {
        [r, g, b] => Ok(Rgb([*r, *g, *b])),
        _ => Err(format!("expected R,G,B, got '{value}'")),
    }
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let background = match &self.background_image {
            Some(path) => BackgroundConfig::Image {
                path: path.clone(),
                mode: self.resize_mode.parse::<ResizeMode>()?,
            },
            None => BackgroundConfig::Solid {
                color: self.background_color,
            },
        };

        let detector = DetectorConfig {
            model_path: self.model.clone(),
            classes: self.classes.clone(),
            confidence: self.confidence,
            encoding: self.mask_encoding,
            ..Default::default()
        };

        let dense = DenseClassifierConfig {
            model_path: self.model.clone(),
            model_url: self.model_url.clone(),
            ..Default::default()
        };

        Ok(PipelineConfig {
            backend: self.backend.clone(),
            segmenter: SegmenterConfig {
                weights: WeightsConfig::new(&self.weights_dir),
                detector,
                dense,
            },
            background,
        })
    }

    fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device_index: self.input_device,
            width: self.capture_width,
            height: self.capture_height,
            fps: self.fps,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let config = args.pipeline_config()?;
    let mut pipeline =
        FramePipeline::from_config(&config).context("Failed to build frame pipeline")?;

    let mut capture =
        WebcamCapture::open(&args.camera_config()).context("Failed to initialize webcam capture")?;

    let mut output = LoopbackSink::open(&args.output_device, args.output_width, args.output_height)
        .context("Failed to initialize v4l2loopback output")?;

    let options = LoopOptions {
        target_fps: args.fps,
        show_mask: args.show_mask,
        stop_on_error: args.stop_on_error,
    };
    run_pipeline(&mut capture, &mut output, &mut pipeline, &options)
}

struct LoopOptions {
    target_fps: u32,
    show_mask: bool,
    stop_on_error: bool,
}

/// Running timing totals for the frame loop
#[derive(Debug, Default)]
struct FrameStats {
    written: u64,
    skipped: u64,
    capture: Duration,
    process: Duration,
    output: Duration,
}

impl FrameStats {
    /// Frames that went through capture and processing, written or not
    fn attempted(&self) -> u64 {
        self.written + self.skipped
    }

    fn average_ms(total: Duration, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            total.as_secs_f64() * 1000.0 / count as f64
        }
    }

    fn log(&self) {
        let attempted = self.attempted();
        let avg_capture_ms = Self::average_ms(self.capture, attempted);
        let avg_process_ms = Self::average_ms(self.process, attempted);
        let avg_output_ms = Self::average_ms(self.output, self.written);
        let total_ms = avg_capture_ms + avg_process_ms + avg_output_ms;

        tracing::info!(
            "Frame {}: capture={:.1}ms, process={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, skipped={}",
            attempted,
            avg_capture_ms,
            avg_process_ms,
            avg_output_ms,
            total_ms,
            1000.0 / total_ms,
            self.skipped
        );
    }
}

fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    pipeline: &mut FramePipeline,
    options: &LoopOptions,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / options.target_fps.max(1) as f32);
    let mut stats = FrameStats::default();

    tracing::info!(
        "Starting frame loop with backend '{}', show_mask={}",
        pipeline.backend_name(),
        options.show_mask
    );
    let (capture_width, capture_height) = capture.resolution();
    let (output_width, output_height) = output.resolution();
    tracing::info!(
        "Frames flow {}x{} -> {}x{}",
        capture_width,
        capture_height,
        output_width,
        output_height
    );
    tracing::info!("Press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        stats.capture += capture_start.elapsed();

        let process_start = Instant::now();
        let processed = if options.show_mask {
            pipeline.mask(&frame).map(|mask| mask.to_rgb())
        } else {
            pipeline.process(&frame)
        };
        stats.process += process_start.elapsed();

        match processed {
            Ok(output_frame) => {
                let output_start = Instant::now();
                output
                    .write_frame(&output_frame)
                    .context("Failed to write frame")?;
                stats.output += output_start.elapsed();
                stats.written += 1;
            }
            Err(e) if !options.stop_on_error => {
                stats.skipped += 1;
                tracing::warn!("Skipping frame: {}", e);
            }
            Err(e) => return Err(anyhow!(e).context("Failed to process frame")),
        }

        if stats.attempted() % 30 == 0 {
            stats.log();
        }

        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}
