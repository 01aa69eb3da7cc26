//! Linux sysfs GPIO
//!
//! Drives the status LED and watches the logging button through the
//! `/sys/class/gpio` interface. The sysfs root is configurable, which also
//! lets tests point it at a scratch directory.

use crate::control::EdgeTrigger;
use crate::indicator::StatusIndicator;
use crate::types::{LoggerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Which button transitions count as a press
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// Released to pressed
    #[default]
    Rising,
    /// Pressed to released
    Falling,
    Both,
}

/// One exported sysfs pin
pub struct SysfsPin {
    pin: u32,
    root: PathBuf,
    exported_here: bool,
}

impl SysfsPin {
    /// Export `pin` under `root` (if needed) and set its direction
    pub fn open(root: &Path, pin: u32, direction: Direction) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{}", pin));
        let mut exported_here = false;

        if !pin_dir.exists() {
            std::fs::write(root.join("export"), pin.to_string())
                .map_err(|e| gpio_error(pin, "export", e))?;
            exported_here = true;
            log::debug!("Exported GPIO {}", pin);
        }

        let gpio = Self {
            pin,
            root: root.to_path_buf(),
            exported_here,
        };
        std::fs::write(gpio.attribute("direction"), direction.as_str())
            .map_err(|e| gpio_error(pin, "set direction", e))?;
        Ok(gpio)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Raw electrical level
    pub fn read(&self) -> Result<bool> {
        let value = std::fs::read_to_string(self.attribute("value"))
            .map_err(|e| gpio_error(self.pin, "read", e))?;
        match value.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(LoggerError::GpioError(format!(
                "GPIO {}: unexpected value '{}'",
                self.pin, other
            ))),
        }
    }

    pub fn write(&self, high: bool) -> Result<()> {
        std::fs::write(self.attribute("value"), if high { "1" } else { "0" })
            .map_err(|e| gpio_error(self.pin, "write", e))
    }

    fn attribute(&self, name: &str) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin)).join(name)
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        if self.exported_here {
            if let Err(e) = std::fs::write(self.root.join("unexport"), self.pin.to_string()) {
                log::debug!("Failed to unexport GPIO {}: {}", self.pin, e);
            }
        }
    }
}

fn gpio_error(pin: u32, action: &str, e: std::io::Error) -> LoggerError {
    LoggerError::GpioError(format!("GPIO {}: {} failed: {}", pin, action, e))
}

/// Status LED on a sysfs output pin
pub struct SysfsLed {
    pin: SysfsPin,
    active_low: bool,
}

impl SysfsLed {
    /// Open the LED pin, initially off
    pub fn open(root: &Path, pin: u32, active_low: bool) -> Result<Self> {
        let mut led = Self {
            pin: SysfsPin::open(root, pin, Direction::Out)?,
            active_low,
        };
        led.set(false)?;
        Ok(led)
    }
}

impl StatusIndicator for SysfsLed {
    fn set(&mut self, on: bool) -> Result<()> {
        self.pin.write(on != self.active_low)
    }
}

/// Detects configured transitions in a sampled level
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    edge: Edge,
    last: Option<bool>,
}

impl EdgeDetector {
    pub fn new(edge: Edge) -> Self {
        Self { edge, last: None }
    }

    /// Feed one sample; true if it completes a matching transition
    ///
    /// The first sample only establishes the starting level.
    pub fn update(&mut self, pressed: bool) -> bool {
        let previous = self.last.replace(pressed);
        match previous {
            Some(was) if was != pressed => match self.edge {
                Edge::Rising => pressed,
                Edge::Falling => !pressed,
                Edge::Both => true,
            },
            _ => false,
        }
    }
}

/// Button watcher settings
#[derive(Debug, Clone)]
pub struct ButtonConfig {
    pub pin: u32,
    pub edge: Edge,
    /// Pressed reads as a low level
    pub active_low: bool,
    pub poll_interval: Duration,
}

/// Background thread polling the button pin
pub struct ButtonWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonWatcher {
    /// Open the button pin and start polling it
    pub fn spawn(root: &Path, config: ButtonConfig, mut trigger: EdgeTrigger) -> Result<Self> {
        let pin = SysfsPin::open(root, config.pin, Direction::In)?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("gpio-button".to_string())
            .spawn(move || {
                let mut detector = EdgeDetector::new(config.edge);
                let mut failing = false;

                while !stop_flag.load(Ordering::Relaxed) {
                    match pin.read() {
                        Ok(level) => {
                            failing = false;
                            if detector.update(level != config.active_low) {
                                trigger.on_edge(Instant::now());
                            }
                        }
                        Err(e) if !failing => {
                            log::warn!("Button read failed: {}", e);
                            failing = true;
                        }
                        Err(_) => {}
                    }
                    std::thread::sleep(config.poll_interval);
                }
            })
            .map_err(|e| LoggerError::GpioError(format!("cannot start button thread: {}", e)))?;

        log::info!("Watching button on GPIO {} ({:?} edge)", config.pin, config.edge);
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop polling and wait for the thread
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Button thread panicked");
            }
        }
    }
}

impl Drop for ButtonWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
