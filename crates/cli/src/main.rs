mod preview;
mod progress;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use media_pipeline::{
    AudioFile, ClockElement, GenerationCoordinator, GenerationJob, HttpBackend, JobStatus,
    PipelineConfig, PlaybackController, Quality, RenderBackend, SelectionModel, UploadEvent,
    UploadReceipt, UploadStatus, VideoFormat, VideoType,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blossom")]
#[command(about = "Blossom CLI - Turn music into generated videos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pipeline config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overrides the config file
    #[arg(long, global = true, env = "BLOSSOM_API_URL")]
    api_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct RenderOptions {
    /// Video type (lyrics, music)
    #[arg(long, default_value = "lyrics")]
    video_type: VideoType,

    /// Output format (youtube, horizontal, vertical)
    #[arg(long, default_value = "youtube")]
    format: VideoFormat,

    /// Brightness, 0-100
    #[arg(long, default_value_t = 50.0)]
    brightness: f64,

    /// Contrast, 0-100
    #[arg(long, default_value_t = 50.0)]
    contrast: f64,

    /// Lyrics text size, 0-100 (lyrics videos only)
    #[arg(long, default_value_t = 50.0)]
    text_size: f64,
}

impl RenderOptions {
    fn selection(&self) -> SelectionModel {
        let mut model = SelectionModel::new();
        model.set_video_type(self.video_type);
        model.set_format(self.format);
        model.set_brightness(self.brightness);
        model.set_contrast(self.contrast);
        model.set_text_size(self.text_size);
        model
    }
}

#[derive(Args, Debug, Clone)]
struct PreviewOptions {
    /// Duration of the simulated clip in seconds
    #[arg(long, default_value_t = 30.0)]
    duration: f64,

    /// Native width of the clip
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Native height of the clip
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Quality label (1080p, 720p, 480p)
    #[arg(long, default_value = "720p")]
    quality: Quality,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an audio file
    Upload {
        /// Audio file to upload
        file: PathBuf,
    },

    /// Request a video render
    Generate {
        /// Session id returned by the upload
        #[arg(short, long)]
        session: Option<String>,

        #[command(flatten)]
        options: RenderOptions,
    },

    /// Show the status of an upload session
    Status {
        /// Session id
        session: String,
    },

    /// Download a rendered video
    Download {
        /// Video URL, absolute or relative to the backend
        url: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Interactive playback preview of a rendered video
    Preview {
        /// Video URL
        url: String,

        #[command(flatten)]
        preview: PreviewOptions,
    },

    /// Upload, generate and optionally preview and download in one go
    Create {
        /// Audio file to upload
        file: PathBuf,

        #[command(flatten)]
        options: RenderOptions,

        /// Save the rendered video here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Open the interactive preview once the video is ready
        #[arg(long)]
        preview: bool,
    },

    /// Write a config file with default settings
    Config {
        /// Output file path
        #[arg(default_value = "blossom.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(cli.config.as_deref(), cli.api_url.as_deref())?;
    debug!("Using backend {}", config.api_url);

    match cli.command {
        Commands::Upload { file } => upload_command(&config, &file).await.map(|_| ()),
        Commands::Generate { session, options } => {
            generate_command(&config, session, &options).await.map(|_| ())
        }
        Commands::Status { session } => status_command(&config, &session).await,
        Commands::Download { url, output } => download_command(&config, &url, &output).await,
        Commands::Preview { url, preview } => preview_command(&url, &preview).await,
        Commands::Create {
            file,
            options,
            output,
            preview,
        } => create_command(&config, &file, &options, output, preview).await,
        Commands::Config { output, force } => config_command(&config, &output, force),
    }
}

fn load_config(path: Option<&Path>, api_url: Option<&str>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = api_url {
        config = config.with_api_url(url);
    }
    Ok(config)
}

fn backend(config: &PipelineConfig) -> Result<Arc<dyn RenderBackend>> {
    Ok(Arc::new(HttpBackend::new(config.clone())?))
}

async fn upload_command(config: &PipelineConfig, path: &Path) -> Result<UploadReceipt> {
    let file = AudioFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!("Uploading {} ({}, {} bytes)", file.name(), file.content_type(), file.len());

    let mut monitor =
        media_pipeline::TransferMonitor::new(backend(config)?).with_max_upload_bytes(config.max_upload_bytes);
    monitor.select(file)?;
    if !monitor.submit()? {
        bail!("{} is empty, nothing to upload", path.display());
    }

    let bar = progress::bytes_bar(monitor.task().byte_total, "Uploading");
    while let Some(event) = monitor.next_event().await {
        if let UploadEvent::Progress {
            bytes_transferred, ..
        } = event
        {
            bar.set_position(bytes_transferred);
        }
    }

    let task = monitor.task();
    match (&task.status, &task.receipt) {
        (UploadStatus::Complete, Some(receipt)) => {
            bar.finish_with_message("Uploaded");
            println!("{}", receipt.message);
            if let Some(session) = &receipt.session_id {
                println!("Session: {}", session);
            }
            Ok(receipt.clone())
        }
        _ => {
            bar.abandon_with_message("Failed");
            bail!(task.error.clone().unwrap_or_else(|| "Upload failed".to_string()))
        }
    }
}

async fn generate_command(
    config: &PipelineConfig,
    session: Option<String>,
    options: &RenderOptions,
) -> Result<GenerationJob> {
    let mut request = options.selection().snapshot();
    match session {
        Some(session) => request = request.with_session(session),
        None => warn!("No session id given, the backend may reject the request"),
    }
    info!(
        "Generating {} video ({}, brightness {}, contrast {})",
        request.video_type, request.format, request.brightness, request.contrast
    );

    let coordinator = GenerationCoordinator::new(backend(config)?);
    let spinner = progress::spinner("Generating video");
    let job = coordinator.generate(request).await;

    match job.status {
        JobStatus::Succeeded => {
            spinner.finish_with_message("Video ready");
            if let Some(url) = &job.result_url {
                println!("Video:    {}", url);
            }
            if let Some(url) = &job.download_url {
                println!("Download: {}", url);
            }
            Ok(job)
        }
        _ => {
            spinner.abandon_with_message("Generation failed");
            bail!(job.error.unwrap_or_else(|| "generation failed".to_string()))
        }
    }
}

async fn status_command(config: &PipelineConfig, session: &str) -> Result<()> {
    let status = backend(config)?.session_status(session).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn download_command(config: &PipelineConfig, url: &str, output: &Path) -> Result<()> {
    let bar = progress::bytes_bar(0, "Downloading");
    let progress_bar = bar.clone();
    let written = backend(config)?
        .download(url, output, &move |done, total| {
            if let Some(total) = total {
                progress_bar.set_length(total);
            }
            progress_bar.set_position(done);
        })
        .await;

    match written {
        Ok(bytes) => {
            bar.finish_with_message("Downloaded");
            info!("Saved {} bytes to {}", bytes, output.display());
            Ok(())
        }
        Err(e) => {
            bar.abandon_with_message("Failed");
            Err(e.into())
        }
    }
}

async fn preview_command(url: &str, options: &PreviewOptions) -> Result<()> {
    let element = ClockElement::new(options.duration, options.width, options.height);
    let mut controller = PlaybackController::new(element);
    controller.bind(url);
    controller.set_quality(options.quality);
    preview::run(&mut controller).await
}

async fn create_command(
    config: &PipelineConfig,
    file: &Path,
    options: &RenderOptions,
    output: Option<PathBuf>,
    preview: bool,
) -> Result<()> {
    let receipt = upload_command(config, file).await?;
    let job = generate_command(config, receipt.session_id, options).await?;
    let Some(video_url) = job.result_url.clone() else {
        bail!("Backend returned no video url");
    };

    if preview {
        let (width, height) = match options.format {
            VideoFormat::Vertical => (1080, 1920),
            VideoFormat::Youtube | VideoFormat::Horizontal => (1920, 1080),
        };
        let preview_options = PreviewOptions {
            duration: 30.0,
            width,
            height,
            quality: Quality::default(),
        };
        preview_command(&video_url, &preview_options).await?;
    }

    if let Some(output) = output {
        let url = job.download_url.as_deref().unwrap_or(&video_url);
        download_command(config, url, &output).await?;
    }

    Ok(())
}

fn config_command(config: &PipelineConfig, output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    config.save(output)?;
    info!("Config written to {}", output.display());
    Ok(())
}
