//! LUX - real-time pattern engine for addressable LED fixtures
//!
//! Builds a show (from the configured project file, or a demo show),
//! renders it and streams frames to the configured Art-Net and KiNET hosts.
//! Raw MIDI can be typed on stdin as hex bytes, e.g. `90 3c 7f`.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lux_input::InputSender;
use lux_output::{ByteOrder, Correction, KinetVersion, UdpOutput};
use lux_render::builtin::{Chase, Dim, Rainbow, Solid};
use lux_render::{
    BlendMode, Channel, EffectSlot, Engine, EngineEvent, Modulator, Pattern, Registry, StripModel,
    Waveform,
};
use lux_show::{Config, Project};

#[derive(Parser)]
#[command(name = "lux", about = "Real-time pattern engine for addressable LED fixtures")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after this many seconds; runs until killed otherwise
    #[arg(long)]
    seconds: Option<f64>,
    /// Override the configured frame rate
    #[arg(long)]
    fps: Option<f64>,
    /// Render on the main thread instead of a render thread
    #[arg(long)]
    sync: bool,
}

/// How often achieved frame rate is logged
const STATS_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(fps) = cli.fps {
        config.fps = fps;
    }
    if cli.sync {
        config.threaded = false;
    }
    info!(
        pixels = config.pixels,
        fps = config.fps,
        space = config.color_space.name(),
        "Starting LUX"
    );

    let engine = Arc::new(Engine::new(
        config.engine_config(),
        Arc::new(StripModel::new(config.pixels)),
    ));
    let registry = Registry::with_builtins();
    load_show(&engine, &registry, &config)?;

    for output in build_outputs(&config)? {
        engine.add_output(Box::new(output));
    }
    if engine.output_count() == 0 {
        info!("No output hosts configured; rendering without sending");
    }

    spawn_stdin_reader(engine.input_sender());

    let deadline = cli.seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    if config.threaded {
        run_threaded(&engine, deadline)?;
    } else {
        run_sync(&engine, deadline, config.fps)?;
    }

    let stats = engine.stats();
    info!(frames = stats.frames, fps = %format_args!("{:.1}", stats.fps), "Stopped");

    if let Some(ref path) = config.project {
        Project::capture(&engine).save(path)?;
    }
    Ok(())
}

/// Restore the configured project, or fall back to the demo show
fn load_show(engine: &Engine, registry: &Registry, config: &Config) -> anyhow::Result<()> {
    if let Some(ref path) = config.project {
        if path.exists() {
            let project = Project::load(path)?;
            project.apply(engine, registry)?;
            return Ok(());
        }
        info!("Project {} not found; starting from the demo show", path.display());
    }
    build_demo(engine, config)
}

fn build_demo(engine: &Engine, config: &Config) -> anyhow::Result<()> {
    let mut rainbow = Pattern::new(Rainbow::new()).with_label("rainbow");
    rainbow
        .core_mut()
        .add_modulator(Modulator::new("brightness", Waveform::Sine, 8000.0).with_depth(0.4))?;

    let mut main = Channel::new(vec![
        rainbow,
        Pattern::new(Chase::new()).with_label("chase"),
        Pattern::new(Solid::new(0xFFFF_8C1A)).with_label("amber"),
    ])?
    .with_label("main");
    main.set_transition_ms(config.transition_ms);
    main.set_auto_cycle_ms(config.auto_cycle_ms);
    main.set_auto_cycle(true);
    engine.add_channel(main);

    let mut sparkle = Channel::new(vec![Pattern::new(Chase::new()).with_label("sparkle")])?
        .with_label("overlay");
    sparkle.set_blend_mode(BlendMode::Add);
    sparkle.set_fader(0.5);
    sparkle.set_monitor_input(true);
    engine.add_channel(sparkle);

    engine.add_effect(EffectSlot::new(Dim).with_label("master"));
    engine.with_effects(|chain| chain[0].params_mut().set("level", 0.8))?;
    Ok(())
}

fn build_outputs(config: &Config) -> anyhow::Result<Vec<UdpOutput>> {
    let order = config.byte_order.parse::<ByteOrder>().unwrap_or_else(|e| {
        warn!("{e}; using rgb");
        ByteOrder::Rgb
    });
    let correction = Correction::new(config.brightness, config.gamma);

    let mut outputs = Vec::new();
    if let Some(ref host) = config.artnet_host {
        if config.pixels > lux_output::ArtNetDatagram::MAX_PIXELS {
            warn!(
                "Art-Net carries {} pixels per universe; the rest are dropped",
                lux_output::ArtNetDatagram::MAX_PIXELS
            );
        }
        outputs.push(
            UdpOutput::artnet(host, 0)?
                .with_order(order)
                .with_correction(correction.clone())
                .with_fps(config.fps),
        );
    }
    if let Some(ref host) = config.kinet_host {
        outputs.push(
            UdpOutput::kinet(host, KinetVersion::PortOut, 1)?
                .with_order(order)
                .with_correction(correction)
                .with_fps(config.fps),
        );
    }
    Ok(outputs)
}

/// Feed hex MIDI typed on stdin into the engine's input queue
fn spawn_stdin_reader(mut sender: InputSender) {
    let spawned = thread::Builder::new()
        .name("lux-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_hex(&line) {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => match sender.send_bytes(&bytes) {
                        Ok(n) => debug!("queued {n} input messages"),
                        Err(e) => {
                            warn!("input closed: {e}");
                            break;
                        }
                    },
                    Err(token) => warn!("not a hex byte: {token:?}"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("stdin input unavailable: {e}");
    }
}

fn parse_hex(line: &str) -> Result<Vec<u8>, String> {
    line.split_whitespace()
        .map(|token| {
            let digits = token.trim_start_matches("0x");
            u8::from_str_radix(digits, 16).map_err(|_| token.to_string())
        })
        .collect()
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn run_threaded(engine: &Arc<Engine>, deadline: Option<Instant>) -> anyhow::Result<()> {
    let events = engine.subscribe();
    engine.start()?;

    while !expired(deadline) {
        thread::sleep(STATS_INTERVAL);
        for event in events.try_iter() {
            if let EngineEvent::RenderFailed { message } = event {
                engine.stop();
                anyhow::bail!("render loop failed: {message}");
            }
        }
        log_stats(engine);
    }

    engine.stop();
    Ok(())
}

fn run_sync(engine: &Engine, deadline: Option<Instant>, fps: f64) -> anyhow::Result<()> {
    let frame = Duration::from_secs_f64(1.0 / fps.max(1.0));
    let mut last_log = Instant::now();

    while !expired(deadline) {
        let start = Instant::now();
        engine.tick()?;
        if last_log.elapsed() >= STATS_INTERVAL {
            log_stats(engine);
            last_log = Instant::now();
        }
        if let Some(rest) = frame.checked_sub(start.elapsed()) {
            thread::sleep(rest);
        }
    }
    Ok(())
}

fn log_stats(engine: &Engine) {
    let stats = engine.stats();
    info!(
        frames = stats.frames,
        fps = %format_args!("{:.1}", stats.fps),
        frame_ms = %format_args!("{:.2}", stats.last_frame_ms),
        "render"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_render::FrameStatus;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("90 3c 7F"), Ok(vec![0x90, 0x3c, 0x7f]));
        assert_eq!(parse_hex("0xb0 07 40"), Ok(vec![0xb0, 0x07, 0x40]));
        assert_eq!(parse_hex("   "), Ok(vec![]));
        assert_eq!(parse_hex("90 zz"), Err("zz".to_string()));
    }

    #[test]
    fn test_demo_show_renders() {
        let config = Config {
            pixels: 16,
            ..Config::default()
        };
        let engine = Engine::new(config.engine_config(), Arc::new(StripModel::new(16)));
        build_demo(&engine, &config).unwrap();
        assert_eq!(engine.channel_count(), 2);
        assert_eq!(engine.tick_delta(16.0).unwrap(), FrameStatus::Rendered);
        assert_eq!(engine.frame().len(), 16);
    }

    #[test]
    fn test_outputs_follow_config() {
        let config = Config {
            artnet_host: Some("127.0.0.1".to_string()),
            kinet_host: Some("127.0.0.1:7000".to_string()),
            byte_order: "bogus".to_string(),
            ..Config::default()
        };
        let outputs = build_outputs(&config).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].target().port(), 6454);
        assert_eq!(outputs[0].order(), ByteOrder::Rgb);
        assert_eq!(outputs[1].target().port(), 7000);

        assert!(build_outputs(&Config::default()).unwrap().is_empty());
    }
}
