// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for capture operations
//!
//! This module provides command-line functionality for:
//! - Listing capture devices
//! - Showing and probing slot candidates
//! - Saving snapshots and watching a stream

use chrono::Local;
use slotcam::backends::camera::{
    CaptureSource, DecodedFrame, ResolvedSource, SourceResolver, candidates,
};
use slotcam::config::CaptureConfig;
use slotcam::constants::defaults;
use slotcam::errors::{CaptureError, FrameError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// List capture-capable V4L2 nodes
#[cfg(target_os = "linux")]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    use slotcam::backends::camera::v4l2_utils;

    let devices = v4l2_utils::enumerate_capture_devices();
    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Capture devices:");
    println!();
    for device in &devices {
        let number = v4l2_utils::video_node_number(&device.path)
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  [{}] {}", number, device.card);
        println!("      Path: {}", device.path);
        if device.real_path != device.path {
            println!("      Real path: {}", device.real_path);
        }
        if !device.driver.is_empty() {
            println!("      Driver: {}", device.driver);
        }
        println!();
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    println!("Device enumeration is only available on Linux; use indices or pipelines.");
    Ok(())
}

/// Requested slots, or the default pair
fn slots(requested: &[u32]) -> Vec<u32> {
    if requested.is_empty() {
        (0..defaults::SLOT_COUNT).collect()
    } else {
        requested.to_vec()
    }
}

/// Print the ordered candidates for each slot
pub fn show_candidates(
    config: &CaptureConfig,
    requested: &[u32],
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Priority: {:?}", config.priority);
    for slot in slots(requested) {
        println!();
        println!("Slot {}:", slot);
        for (position, source) in candidates::build(slot, config).iter().enumerate() {
            println!("  {}. [{}] {}", position + 1, source.kind(), source.spec());
        }
    }
    Ok(())
}

/// Resolve each slot and report the outcome
pub fn probe(config: &CaptureConfig, requested: &[u32]) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = SourceResolver::new(config.resolver_options(), config.backend_options());
    let request = config.request();

    for slot in slots(requested) {
        let list = candidates::build(slot, config);
        match resolver.resolve(&list, &request) {
            Ok(mut resolved) => {
                println!(
                    "Slot {}: {} (candidate {} of {}), {}x{} {:?}",
                    slot,
                    resolved.backend.describe(),
                    resolved.position + 1,
                    list.len(),
                    resolved.first_frame.width,
                    resolved.first_frame.height,
                    resolved.first_frame.channels,
                );
                // Free the device before the next slot may want it
                resolved.backend.close();
            }
            Err(CaptureError::AllCandidatesExhausted { attempted }) => {
                println!("Slot {}: no camera available ({} candidates tried)", slot, attempted);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn resolve_slot(
    config: &CaptureConfig,
    slot: u32,
    source: Option<&str>,
) -> Result<ResolvedSource, Box<dyn std::error::Error>> {
    let list = match source {
        Some(spec) => vec![CaptureSource::parse(spec)?],
        None => candidates::build(slot, config),
    };
    let resolver = SourceResolver::new(config.resolver_options(), config.backend_options());
    Ok(resolver.resolve(&list, &config.request())?)
}

fn get_default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slotcam")
}

/// Save one frame as an image file
pub fn snapshot(
    config: &CaptureConfig,
    slot: u32,
    source: Option<&str>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut resolved = resolve_slot(config, slot, source)?;
    println!("Using source: {}", resolved.backend.describe());

    // Prefer a fresh frame; the validation frame is the fallback
    let frame = match resolved.backend.read_frame() {
        Ok(frame) => frame,
        Err(_) => resolved.first_frame.clone(),
    };
    resolved.backend.close();

    let output_path = match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => {
            let dir = get_default_snapshot_dir();
            std::fs::create_dir_all(&dir)?;
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("snapshot_slot{}_{}.png", slot, timestamp))
        }
    };

    let image = frame
        .to_image()
        .ok_or("Frame buffer does not match its dimensions")?;
    image.save(&output_path)?;

    println!(
        "Snapshot saved: {} ({}x{})",
        output_path.display(),
        frame.width,
        frame.height
    );
    Ok(())
}

/// Read outcomes over some window
#[derive(Debug, Default, Clone, Copy)]
struct WatchStats {
    frames: u64,
    timeouts: u64,
    decode_errors: u64,
    device_errors: u64,
}

impl WatchStats {
    fn record(&mut self, result: &Result<DecodedFrame, FrameError>) {
        match result {
            Ok(_) => self.frames += 1,
            Err(FrameError::Timeout) => self.timeouts += 1,
            Err(FrameError::Decode(_)) => self.decode_errors += 1,
            Err(_) => self.device_errors += 1,
        }
    }

    fn misses(&self) -> u64 {
        self.timeouts + self.decode_errors + self.device_errors
    }

    fn absorb(&mut self, other: &WatchStats) {
        self.frames += other.frames;
        self.timeouts += other.timeouts;
        self.decode_errors += other.decode_errors;
        self.device_errors += other.device_errors;
    }
}

/// One resolved slot being watched
struct WatchedSlot {
    slot: u32,
    resolved: ResolvedSource,
    window: WatchStats,
    total: WatchStats,
    stopped: bool,
}

/// Read every resolved slot once per tick until the duration passes or Ctrl+C
pub fn watch(
    config: &CaptureConfig,
    requested: &[u32],
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = SourceResolver::new(config.resolver_options(), config.backend_options());
    let request = config.request();

    let mut watched = Vec::new();
    for slot in slots(requested) {
        match resolver.resolve(&candidates::build(slot, config), &request) {
            Ok(resolved) => {
                println!("Slot {}: {}", slot, resolved.backend.describe());
                watched.push(WatchedSlot {
                    slot,
                    resolved,
                    window: WatchStats::default(),
                    total: WatchStats::default(),
                    stopped: false,
                });
            }
            Err(CaptureError::AllCandidatesExhausted { .. }) => {
                println!("Slot {}: no camera available", slot);
            }
            Err(e) => return Err(e.into()),
        }
    }
    if watched.is_empty() {
        return Err("No camera available for any slot".into());
    }

    println!("Watching... (press Ctrl+C to stop early)");

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let tick = Duration::from_secs_f64(1.0 / request.fps.max(1.0));
    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);
    let mut window_start = Instant::now();

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        let tick_start = Instant::now();
        for entry in watched.iter_mut().filter(|w| !w.stopped) {
            let result = entry.resolved.backend.read_frame();
            entry.window.record(&result);
            if matches!(result, Err(FrameError::EndOfStream) | Err(FrameError::NotOpened)) {
                entry.stopped = true;
            }
        }
        if watched.iter().all(|w| w.stopped) {
            println!();
            println!("All sources stopped delivering frames");
            break;
        }

        let elapsed = window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let line: Vec<String> = watched
                .iter()
                .map(|w| {
                    format!(
                        "slot {}: {:5.1} fps, {} missed",
                        w.slot,
                        w.window.frames as f64 / elapsed.as_secs_f64(),
                        w.window.misses()
                    )
                })
                .collect();
            print!("\r{}   ", line.join("  |  "));
            std::io::Write::flush(&mut std::io::stdout())?;

            for entry in watched.iter_mut() {
                let window = entry.window;
                entry.total.absorb(&window);
                entry.window = WatchStats::default();
            }
            window_start = Instant::now();
        }

        if let Some(rest) = tick.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    println!();

    let seconds = start.elapsed().as_secs_f64().max(f64::EPSILON);
    for entry in watched.iter_mut() {
        let window = entry.window;
        entry.total.absorb(&window);
        entry.resolved.backend.close();

        let total = entry.total;
        println!(
            "Slot {}: {} frames ({:.1} fps), timeouts: {}, decode errors: {}, device errors: {}",
            entry.slot,
            total.frames,
            total.frames as f64 / seconds,
            total.timeouts,
            total.decode_errors,
            total.device_errors
        );
    }
    Ok(())
}
