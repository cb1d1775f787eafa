use clap::ValueEnum;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::{IndicatorDriver, IndicatorError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    /// sysfs GPIO when the host has it, otherwise log only
    Auto,
    Sysfs,
    Log,
}

/// Stand-in for hosts without GPIO: logs every level change.
#[derive(Debug, Default)]
pub struct LogDriver;

impl IndicatorDriver for LogDriver {
    fn set_level(&mut self, indicator_id: u32, high: bool) -> Result<(), IndicatorError> {
        info!("{indicator_id} => {}", if high { "HIGH" } else { "LOW" });
        Ok(())
    }
}

/// GPIO through the legacy `/sys/class/gpio` interface.
#[derive(Debug)]
pub struct SysfsGpioDriver {
    root: PathBuf,
    configured: HashSet<u32>,
}

impl SysfsGpioDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            configured: HashSet::new(),
        }
    }

    pub fn is_available(root: &Path) -> bool {
        root.join("export").exists()
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn configure(&mut self, pin: u32) -> std::io::Result<()> {
        if self.configured.contains(&pin) {
            return Ok(());
        }
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            fs::write(self.root.join("export"), pin.to_string())?;
        }
        fs::write(dir.join("direction"), "out")?;
        self.configured.insert(pin);
        Ok(())
    }
}

impl IndicatorDriver for SysfsGpioDriver {
    fn set_level(&mut self, indicator_id: u32, high: bool) -> Result<(), IndicatorError> {
        let write_error = |err: std::io::Error| IndicatorError::Write {
            id: indicator_id,
            message: err.to_string(),
        };
        self.configure(indicator_id).map_err(write_error)?;
        fs::write(
            self.pin_dir(indicator_id).join("value"),
            if high { "1" } else { "0" },
        )
        .map_err(write_error)
    }
}

pub fn build_driver(kind: DriverKind, gpio_root: &Path) -> Box<dyn IndicatorDriver> {
    match kind {
        DriverKind::Log => Box::new(LogDriver),
        DriverKind::Sysfs => Box::new(SysfsGpioDriver::new(gpio_root)),
        DriverKind::Auto => {
            if SysfsGpioDriver::is_available(gpio_root) {
                info!(event = "indicator_driver", driver = "sysfs", root = %gpio_root.display());
                Box::new(SysfsGpioDriver::new(gpio_root))
            } else {
                warn!(event = "indicator_driver", driver = "log", reason = "no gpio");
                Box::new(LogDriver)
            }
        }
    }
}
