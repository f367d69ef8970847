use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};
use tokio_util::sync::CancellationToken;

use dualcast::capture::audio::MicrophoneCapture;
use dualcast::capture::{SceneSurface, ScreenInfo, SerializedRenderer, TestPatternRenderer};
use dualcast::config::Config;
use dualcast::encoder::{ContainerSink, FfmpegContainer};
use dualcast::pipeline::MediaClock;
use dualcast::pipeline::sender::{AudioInput, OutputMode, Recorder, WriterEvent};

fn cli() -> Command {
    Command::new("dualcast")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to the platform config directory).")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Where to write the recording.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Stop after this many seconds instead of waiting for Ctrl-C.")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .help("Do not open the microphone.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration and exit.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log debug output.")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    dualcast::logging::init(matches.get_flag("verbose"));

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    if let Err(e) = run(&matches).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("Failed to load configuration")?;

    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.writer.output = output.clone();
    }
    if matches.get_flag("no-audio") {
        config.writer.audio_enabled = false;
    }
    if matches.get_flag("print-config") {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    if config.writer.output_mode.uses_stream() {
        warn!("No stream client is built into this binary, recording to file only");
        config.writer.output_mode = OutputMode::FileOnly;
    }

    let clock = MediaClock::new();
    let screen = ScreenInfo::new(config.capture.display, config.capture.native);
    let source = Arc::new(SceneSurface::new(
        SerializedRenderer::new(Arc::new(TestPatternRenderer::new())),
        screen,
        clock.clone(),
    ));

    let audio = if config.writer.audio_enabled {
        let cancel = CancellationToken::new();
        match MicrophoneCapture::start(cancel.clone(), clock.clone()) {
            Ok((format, _)) if !FfmpegContainer::supports_audio(format) => {
                warn!(
                    "Microphone runs at {} Hz x{}, which the container cannot encode; recording video only",
                    format.sample_rate, format.channels
                );
                cancel.cancel();
                None
            }
            Ok((format, samples)) => Some(AudioInput {
                format,
                samples,
                cancel,
            }),
            Err(e) => {
                warn!("Microphone unavailable: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let output = config.writer.output.clone();
    let mut recorder = Recorder::new(
        source,
        config.writer.clone(),
        &config.capture,
        clock,
        |path| FfmpegContainer::open(path).map(|c| Box::new(c) as Box<dyn ContainerSink>),
        None,
        audio,
    );
    let mut events = recorder
        .take_events()
        .context("Recorder events already taken")?;

    // gracefully stop the recording on SIGINT, SIGTERM, or SIGHUP
    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.cancel()).context("Error setting Ctrl-C handler")?;
    }

    let duration = matches.get_one::<f64>("duration").copied();
    let timer = async move {
        match duration.and_then(|seconds| Duration::try_from_secs_f64(seconds).ok()) {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    recorder.start();
    info!("Recording to {} (Ctrl-C to stop)", output.display());

    let mut last_second = 0;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = &mut timer => break,
            event = events.recv() => match event {
                Some(WriterEvent::Progress(elapsed)) => {
                    if elapsed.as_secs() > last_second {
                        last_second = elapsed.as_secs();
                        info!("Recording: {}s", last_second);
                    }
                }
                Some(WriterEvent::Failed { error, message }) => {
                    error!("{} ({:?})", message, error);
                    break;
                }
                None => break,
            },
        }
    }

    recorder.stop().await?;
    info!("Saved {}", output.display());
    Ok(())
}
