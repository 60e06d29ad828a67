use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::capture::FrameSource;
use crate::color::{self, Rgb};
use crate::config::ColorConfig;
use crate::led_map::LedMap;
use crate::link::SerialLink;
use crate::protocol::FrameEncoder;

/// The continuous capture -> process -> encode -> send driver.
///
/// Owns all per-cycle state. `raw_prev` holds the previous cycle's raw
/// sample and `displayed` the frame last sent to hardware; both are
/// allocated once and overwritten in place every cycle.
pub struct Pipeline<S: FrameSource, P: Write> {
    map: LedMap,
    sampler: S,
    link: SerialLink<P>,
    encoder: FrameEncoder,
    kelvin: u32,
    fade: u8,
    floor: u16,
    raw_prev: Vec<Rgb>,
    displayed: Vec<Rgb>,
    publisher: Option<SyncSender<Vec<Rgb>>>,
    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    frames_sent: Arc<AtomicU64>,
    debug: bool,
}

impl<S: FrameSource, P: Write> Pipeline<S, P> {
    pub fn new(
        map: LedMap,
        settings: &ColorConfig,
        magic: [u8; 3],
        sampler: S,
        link: SerialLink<P>,
        debug: bool,
    ) -> Self {
        let led_count = map.led_count();
        let encoder = FrameEncoder::new(magic, led_count);

        Pipeline {
            map,
            sampler,
            link,
            encoder,
            kelvin: settings.temperature_kelvin,
            fade: settings.fade(),
            floor: settings.min_brightness,
            raw_prev: vec![Rgb::BLACK; led_count],
            displayed: vec![Rgb::BLACK; led_count],
            publisher: None,
            running: Arc::new(AtomicBool::new(true)),
            cycles: Arc::new(AtomicU64::new(0)),
            frames_sent: Arc::new(AtomicU64::new(0)),
            debug,
        }
    }

    /// Get a clone of the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Subscribe to completed frame snapshots.
    ///
    /// The channel holds a single slot: the worker clones the finished
    /// frame into it and drops the clone when the observer has not caught
    /// up yet, so a reader only ever sees whole frames and never blocks
    /// the cycle.
    pub fn subscribe(&mut self) -> Receiver<Vec<Rgb>> {
        let (sender, receiver) = mpsc::sync_channel(1);
        self.publisher = Some(sender);
        receiver
    }

    /// Run cycles back-to-back until the running flag is cleared.
    pub fn run(&mut self) -> Result<()> {
        if self.debug {
            println!(
                "✓ Pipeline started: {} LEDs, {}x{} grid, device {}",
                self.map.led_count(),
                self.map.grid_width(),
                self.map.grid_height(),
                self.link.port_name().unwrap_or("(none)")
            );
            self.spawn_stats_thread();
        }

        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.cycle() {
                eprintln!("✗ Cycle skipped: {:#}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }

        Ok(())
    }

    /// One full cycle. A capture failure aborts the cycle before any state
    /// is touched, so `raw_prev`/`displayed` never hold partial data.
    fn cycle(&mut self) -> Result<()> {
        let raw = self.sampler.sample(&self.map)?;
        debug_assert_eq!(raw.len(), self.map.led_count());

        for (i, &sample) in raw.iter().enumerate() {
            let corrected = color::adjust_temperature(sample, self.kelvin);
            let floored = color::apply_brightness_floor(corrected, self.floor);
            self.displayed[i] = color::transition(floored, self.raw_prev[i], self.fade);
        }

        // The fade anchors on the raw sample, not on what was displayed.
        // This is not the classic exponential smoother; see DESIGN.md.
        self.raw_prev.copy_from_slice(&raw);

        self.publish();

        let frame = self.encoder.encode(&self.displayed);
        if self.link.write_frame(frame) {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn publish(&mut self) {
        let Some(sender) = &self.publisher else {
            return;
        };

        match sender.try_send(self.displayed.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                // Observer still holds the previous snapshot; drop this one.
            }
            Err(TrySendError::Disconnected(_)) => {
                self.publisher = None;
            }
        }
    }

    /// Best effort: turn the strip off so it does not freeze on the last
    /// image after exit.
    pub fn shutdown(&mut self) {
        if self.debug {
            println!("Turning off LEDs...");
        }

        self.displayed.fill(Rgb::BLACK);
        let frame = self.encoder.encode(&self.displayed);
        self.link.write_frame(frame);

        if self.debug {
            println!("✓ Stopped");
        }
    }

    fn spawn_stats_thread(&self) {
        let cycles = Arc::clone(&self.cycles);
        let frames_sent = Arc::clone(&self.frames_sent);
        let running = Arc::clone(&self.running);

        thread::spawn(move || {
            let mut last_cycles = 0u64;
            let mut last_sent = 0u64;

            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(5));

                let current_cycles = cycles.load(Ordering::Relaxed);
                let current_sent = frames_sent.load(Ordering::Relaxed);
                println!(
                    "[Stats] Capture: {:.1} fps, sent: {:.1} fps",
                    (current_cycles - last_cycles) as f64 / 5.0,
                    (current_sent - last_sent) as f64 / 5.0
                );

                last_cycles = current_cycles;
                last_sent = current_sent;
            }
        });
    }
}
