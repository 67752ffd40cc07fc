use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use clipwriter_core::pipeline::multi_frame_writer::MultiFrameWriter;
use clipwriter_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use clipwriter_core::publish::domain::clip_publisher::ClipPublisher;
use clipwriter_core::publish::infrastructure::directory_publisher::DirectoryPublisher;
use clipwriter_core::shared::constants::{DEFAULT_FPS, SCRATCH_DIR_NAME};
use clipwriter_core::shared::raw_frame::{raw_frame_len, RawFrame};
use clipwriter_core::shared::video_metadata::VideoMetadata;
use clipwriter_core::shared::window_config::WindowConfig;
use clipwriter_core::video::domain::thumbnail_extractor::ThumbnailExtractor;
use clipwriter_core::video::infrastructure::encoder_factory::CodecPreference;
use clipwriter_core::video::infrastructure::jpeg_thumbnail_extractor::JpegThumbnailExtractor;

/// Encode a window of frames from a raw I420 stream into an MP4 clip.
#[derive(Parser)]
#[command(name = "clipwriter")]
struct Cli {
    /// Raw I420 input: frames of width*height*3/2 bytes, back to back.
    input: PathBuf,

    /// Output MP4 file.
    output: PathBuf,

    /// Frame width in pixels (even).
    #[arg(long)]
    width: u32,

    /// Frame height in pixels (even).
    #[arg(long)]
    height: u32,

    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    /// Index of the frame the clip is centred on.
    #[arg(long)]
    center: i64,

    /// Frames to keep on each side of the centre.
    #[arg(long)]
    radius: Option<u64>,

    /// Maximum frames to encode (0 = unlimited).
    #[arg(long)]
    budget: Option<u64>,

    /// Reserved; recorded in the config but not used for selection.
    #[arg(long)]
    skip_limit: Option<u64>,

    /// JSON object with totalFrames / neighboringWindowLimit / frameSkippingLimit.
    /// Explicit flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for buffered frames (must not exist; removed when done).
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Encoder: auto, h264, mpeg4, or an ffmpeg encoder name.
    #[arg(long, default_value = "auto")]
    codec: String,

    /// Target bit rate in bits per second (default: width*height).
    #[arg(long)]
    bit_rate: Option<u64>,

    /// Also write <output stem>_thumb.jpg from the centre frame.
    #[arg(long)]
    thumbnail: bool,

    /// Longest side of the thumbnail in pixels.
    #[arg(long)]
    thumbnail_size: Option<u32>,

    /// Copy the finished clip into this library directory.
    #[arg(long)]
    publish_dir: Option<PathBuf>,

    /// Name for the published clip (default: output file name).
    #[arg(long)]
    display_name: Option<String>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let scratch_dir = scratch_dir_for(&cli);
    validate(&cli, &scratch_dir)?;

    let config = build_config(&cli)?;
    let mut metadata = VideoMetadata::new(cli.width, cli.height, cli.fps);
    if let Some(bit_rate) = cli.bit_rate {
        metadata = metadata.with_bit_rate(bit_rate);
    }
    let codec: CodecPreference = cli.codec.parse()?;

    let mut writer =
        MultiFrameWriter::create(&cli.output, &scratch_dir, metadata, config, &codec)?
            .with_logger(Box::new(StdoutPipelineLogger::default()));

    let centre_frame = submit_all(&cli, &mut writer)?;
    writer.finalize_around(cli.center);
    writer.finish()?;

    if !writer.output_kept() {
        return Err(format!(
            "No frames around index {} could be encoded; nothing written",
            cli.center
        )
        .into());
    }
    log::info!("Output written to {}", cli.output.display());

    if cli.thumbnail {
        match centre_frame {
            Some(frame) => {
                let extractor = match cli.thumbnail_size {
                    Some(size) => JpegThumbnailExtractor::with_max_side(size),
                    None => JpegThumbnailExtractor::new(),
                };
                let path = extractor.extract(&frame, &cli.output)?;
                log::info!("Thumbnail written to {}", path.display());
            }
            None => log::warn!("Centre frame {} not in input, no thumbnail", cli.center),
        }
    }

    if let Some(library) = &cli.publish_dir {
        let name = match &cli.display_name {
            Some(name) => name.clone(),
            None => file_name_of(&cli.output)?,
        };
        let published = DirectoryPublisher::new(library).publish(&cli.output, &name)?;
        log::info!("Published to {}", published.path.display());
    }

    Ok(())
}

/// Streams the input into the writer one frame at a time. Returns the
/// centre frame when a thumbnail was requested.
fn submit_all(
    cli: &Cli,
    writer: &mut MultiFrameWriter,
) -> Result<Option<RawFrame>, Box<dyn std::error::Error>> {
    let frame_len = raw_frame_len(cli.width, cli.height);
    let mut reader = BufReader::new(File::open(&cli.input)?);
    let mut centre_frame = None;

    loop {
        let mut buffer = vec![0u8; frame_len];
        let filled = read_full(&mut reader, &mut buffer)?;
        if filled == 0 {
            break;
        }
        if filled < frame_len {
            log::warn!(
                "Ignoring {filled} trailing bytes (less than one {frame_len}-byte frame)"
            );
            break;
        }

        let frame = RawFrame::new(buffer, cli.width, cli.height);
        let index = writer.submit(&frame);
        if cli.thumbnail && i64::try_from(index).ok() == Some(cli.center) {
            centre_frame = Some(frame);
        }
    }

    log::info!("Buffered {} frames", writer.submitted_count());
    Ok(centre_frame)
}

/// Fills `buffer` as far as the input allows. Returns the number of bytes read.
fn read_full(reader: &mut impl Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn build_config(cli: &Cli) -> Result<WindowConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            WindowConfig::from_json_str(&text)?
        }
        None => WindowConfig::default(),
    };
    if let Some(budget) = cli.budget {
        config.total_frame_budget = budget;
    }
    if let Some(radius) = cli.radius {
        config.neighbor_radius = radius;
    }
    if let Some(skip) = cli.skip_limit {
        config.frame_skip_limit = skip;
    }
    Ok(config)
}

fn scratch_dir_for(cli: &Cli) -> PathBuf {
    if let Some(dir) = &cli.scratch_dir {
        return dir.clone();
    }
    let stem = cli
        .output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("clip");
    cli.output
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!(".{stem}.{SCRATCH_DIR_NAME}"))
}

fn file_name_of(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| format!("Output path has no file name: {}", path.display()).into())
}

fn validate(cli: &Cli, scratch_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    VideoMetadata::new(cli.width, cli.height, cli.fps).validate()?;
    if scratch_dir.exists() {
        return Err(format!(
            "Scratch directory already exists and would be deleted: {}",
            scratch_dir.display()
        )
        .into());
    }
    if cli.output.exists() {
        return Err(format!("Output already exists: {}", cli.output.display()).into());
    }
    if cli.display_name.is_some() && cli.publish_dir.is_none() {
        return Err("--display-name requires --publish-dir".into());
    }
    if cli.thumbnail_size == Some(0) {
        return Err("Thumbnail size must be positive".into());
    }
    if cli.bit_rate == Some(0) {
        return Err("Bit rate must be positive".into());
    }
    Ok(())
}
