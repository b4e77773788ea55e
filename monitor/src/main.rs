//! Cardiac monitor front end
//!
//! Configures the HAL, brings up the selected graphics backend and presents frames until the window is
//! closed or the process receives a termination signal.

use std::{error::Error, path::PathBuf, time::Duration};

use calloop::{
    signals::{Signal, Signals},
    EventLoop,
};
use clap::Parser;
use glhal::{
    backend::gfx::{FrameStatus, Gfx},
    hal::{GfxBackend, HalBuilder, I2cBackend, WindowSettings},
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "monitor", about = "Cardiac monitor display")]
struct Args {
    /// Graphics backend: drm, egl-x11 or glx
    #[arg(long)]
    backend: Option<GfxBackend>,

    /// I2C backend: i2c or sim
    #[arg(long)]
    i2c: Option<I2cBackend>,

    /// Index of the DRM connector to drive
    #[arg(long)]
    connector: Option<usize>,

    /// Window width of the windowed backends
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Window height of the windowed backends
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Window title of the windowed backends
    #[arg(long, default_value = "Cardiac Monitor")]
    title: String,

    /// Additionally write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Stop after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

/// First backend compiled into glhal, preferring direct scanout.
fn default_backend() -> Option<GfxBackend> {
    [GfxBackend::Drm, GfxBackend::EglX11, GfxBackend::Glx]
        .into_iter()
        .find(|backend| backend.is_built())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    // Signals have to be blocked before the log writer thread is spawned, it inherits the mask.
    let mut event_loop = EventLoop::<bool>::try_new()?;
    let signals = Signals::new(&[Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP, Signal::SIGQUIT])?;
    event_loop
        .handle()
        .insert_source(signals, |event, _, running| {
            info!(signal = ?event.signal(), "Stopping");
            *running = false;
        })
        .map_err(|err| err.error)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            Some(tracing_appender::non_blocking(file))
        }
        None => None,
    };
    let (file_writer, _guard) = file_layer.unzip();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false)))
        .init();

    let mut builder = HalBuilder::from_env()?;
    if let Some(backend) = args.backend {
        builder.set_gfx_backend(backend)?;
    } else if builder.gfx_backend() == GfxBackend::None {
        let backend = default_backend().ok_or("glhal was built without any graphics backend")?;
        builder.set_gfx_backend(backend)?;
    }
    if let Some(i2c) = args.i2c {
        builder.set_i2c_backend(i2c)?;
    } else if builder.i2c_backend() == I2cBackend::None {
        builder.set_i2c_backend(I2cBackend::Simulated)?;
    }
    if args.connector.is_some() {
        builder.drm_connector(args.connector);
    }
    builder.window(WindowSettings {
        width: args.width,
        height: args.height,
        title: args.title.clone(),
    });

    let hal = builder.init()?;
    let mut gfx = Gfx::new(&hal);
    gfx.init()?;
    info!(
        backend = %gfx.backend(),
        width = gfx.width()?,
        height = gfx.height()?,
        version = gfx.version_string()?,
        "Graphics ready"
    );

    let mut running = true;
    let mut presented = 0u64;
    while running {
        gfx.clear([0.0, 0.0, 0.0, 1.0])?;
        match gfx.page_flip()? {
            FrameStatus::Presented => presented += 1,
            FrameStatus::CloseRequested => {
                info!("Window closed");
                break;
            }
        }
        event_loop.dispatch(Some(Duration::ZERO), &mut running)?;
        if args.frames.is_some_and(|frames| presented >= frames) {
            debug!(presented, "Frame limit reached");
            break;
        }
    }

    gfx.shutdown();
    info!(presented, "Exiting");
    Ok(())
}
