use anyhow::Result;
use clap::Parser;
use std::fs;

mod capture;
mod color;
mod config;
mod led_map;
mod link;
mod pipeline;
mod protocol;

use capture::ScreenSampler;
use config::Config;
use led_map::LedMap;
use link::SystemPorts;
use pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "screenlight")]
#[command(about = "Screenlight - ambient LED backlight driver\n\nSamples the desktop and streams per-LED colors to a serial LED controller.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: String,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (per-port discovery traces)
    #[arg(long)]
    ddebug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_data = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_data)?;
    let magic = config.validate()?;

    // ddebug implies debug
    let debug = cli.debug || cli.ddebug;

    let map = LedMap::new(config.leds.clone())?;
    if debug {
        println!(
            "✓ Loaded {} LEDs on a {}x{} sampling grid",
            map.led_count(),
            map.grid_width(),
            map.grid_height()
        );
    }

    // Discovery runs once, synchronously, before the loop starts.
    let provider = SystemPorts::new(config.device.baud_rate);
    let link = link::discover(&provider, &config.device, cli.ddebug);

    let sampler = ScreenSampler::primary()?;
    let mut pipeline = Pipeline::new(map, &config.color, magic, sampler, link, debug);

    // The on-screen preview is an external collaborator; it consumes whole
    // frame snapshots through this receiver.
    let _preview_frames = config.preview.enabled.then(|| pipeline.subscribe());

    // Set up Ctrl-C handler with graceful shutdown
    let running = pipeline.running_flag();
    let result = ctrlc::set_handler(move || {
        running.store(false, std::sync::atomic::Ordering::Relaxed);
    });

    if let Err(e) = result {
        eprintln!("Warning: Could not set Ctrl-C handler: {}", e);
    }

    // Run pipeline (blocks until shutdown)
    pipeline.run()?;

    // Graceful shutdown - send a black frame to turn off the LEDs
    pipeline.shutdown();

    Ok(())
}
