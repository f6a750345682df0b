//! vidstreamer - run an analytic over an image, video, camera or HTTP
//!
//! Exactly one source is selected per invocation:
//! - `--imagefile <path>`: one frame
//! - `--videofile <path>`: every decodable frame, in order
//! - `--camera_id <id>`: frames until the device stops or Ctrl-C
//! - `--serve [--service_port <port>]`: `POST /process` until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use vidstreamer::ingest::CameraConfig;
use vidstreamer::{
    AnalyticInvoker, AnalyticRegistry, CancelToken, OutputMode, Pipeline, ServiceServer,
    SourceSpec, StreamerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["imagefile", "videofile", "camera_id", "serve"]),
))]
struct Args {
    /// Process a single image file.
    #[arg(long)]
    imagefile: Option<PathBuf>,
    /// Process every frame of a video file.
    #[arg(long)]
    videofile: Option<PathBuf>,
    /// Capture from a camera: a numeric id (/dev/videoN) or a device path.
    #[arg(long = "camera_id")]
    camera_id: Option<String>,
    /// Serve POST /process over HTTP.
    #[arg(long)]
    serve: bool,
    /// Port for --serve (replaces the port of the configured address).
    #[arg(long = "service_port", requires = "serve")]
    service_port: Option<u16>,
    /// Builtin analytic to run.
    #[arg(long)]
    analytic: Option<String>,
    /// Output handler for local runs and served requests.
    #[arg(long, value_enum)]
    output: Option<OutputMode>,
    /// JSON or TOML config file.
    #[arg(long, env = "VIDSTREAMER_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = StreamerConfig::load_from(args.config.as_deref())?;
    if let Some(name) = &args.analytic {
        config.analytic.name = name.clone();
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(port) = args.service_port {
        let mut addr: SocketAddr = config
            .service
            .addr
            .parse()
            .with_context(|| format!("invalid service address '{}'", config.service.addr))?;
        addr.set_port(port);
        config.service.addr = addr.to_string();
    }
    config.validate()?;

    let registry = AnalyticRegistry::with_builtins();
    let analytic = registry.create(&config.analytic.name, &config.analytic)?;
    let invoker = AnalyticInvoker::builder()
        .analytic_boxed(analytic)
        .output_boxed(config.output.handler())
        .build()?;

    if args.serve {
        return serve(&config, invoker);
    }

    let spec = if let Some(path) = args.imagefile {
        SourceSpec::Image(path)
    } else if let Some(path) = args.videofile {
        SourceSpec::Video(path)
    } else if let Some(id) = args.camera_id {
        SourceSpec::Camera(camera_config(&id, &config.camera))
    } else {
        return Err(anyhow!("no frame source selected"));
    };
    run_local(&config, &invoker, &spec)
}

fn camera_config(id: &str, base: &CameraConfig) -> CameraConfig {
    let device = match id.parse::<u32>() {
        Ok(index) => CameraConfig::for_id(index).device,
        Err(_) => id.to_string(),
    };
    CameraConfig {
        device,
        ..base.clone()
    }
}

fn run_local(config: &StreamerConfig, invoker: &AnalyticInvoker, spec: &SourceSpec) -> Result<()> {
    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping after the current frame");
        handler_cancel.cancel();
    })
    .expect("error setting Ctrl-C handler");

    let summary = Pipeline::new(invoker)
        .with_cancel(cancel)
        .with_progress_interval(config.progress_interval)
        .run_spec(spec)?;
    log::info!(
        "processed {} frames in {:.2}s{}",
        summary.frames_processed,
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

fn serve(config: &StreamerConfig, invoker: AnalyticInvoker) -> Result<()> {
    let handle = ServiceServer::new(config.service.clone(), Arc::new(invoker)).spawn()?;
    log::info!("POST http://{}/process", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("vidstreamer waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping service...");
    handle.stop()?;
    Ok(())
}
