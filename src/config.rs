/*
 * This file is part of Cpldmon.
 *
 * Copyright (C) 2025 Cpldmon contributors
 *
 * Cpldmon is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Cpldmon is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Cpldmon. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::registers::BoardVariant;

fn default_variant() -> BoardVariant {
    BoardVariant::Standard
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Which board the CPLD sits on; selects bus, registers and masking.
    #[serde(default = "default_variant")]
    pub variant: BoardVariant,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Override the variant's host bus number (bring-up rigs).
    #[serde(default)]
    pub bus_id: Option<u32>,
    /// Override the ready-line GPIO chip path.
    #[serde(default)]
    pub gpio_chip: Option<String>,
    /// Override the ready-line offset on that chip.
    #[serde(default)]
    pub ready_line: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            variant: default_variant(),
            poll_interval_ms: default_poll_interval_ms(),
            bus_id: None,
            gpio_chip: None,
            ready_line: None,
        }
    }
}

pub fn config_path() -> PathBuf {
    PathBuf::from("/etc/cpldmon/config.json")
}

/// Load the config file, falling back to defaults when it is absent or
/// unreadable. A monitor that cannot read its config still monitors the
/// standard board rather than not monitoring at all.
pub fn load_config(path: &Path) -> MonitorConfig {
    let Ok(data) = fs::read_to_string(path) else {
        return MonitorConfig::default();
    };
    match serde_json::from_str(&data) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!(
                "cpldmon: ignoring malformed config {}: {}",
                path.display(),
                e
            );
            MonitorConfig::default()
        }
    }
}

pub fn validate_config(cfg: &MonitorConfig) -> Result<(), String> {
    if cfg.poll_interval_ms < 100 || cfg.poll_interval_ms > 60_000 {
        return Err(format!(
            "poll_interval_ms {} out of range (100..=60000)",
            cfg.poll_interval_ms
        ));
    }
    if let Some(chip) = &cfg.gpio_chip {
        if !chip.starts_with("/dev/gpiochip") {
            return Err(format!("gpio_chip {} is not a gpiochip device node", chip));
        }
    }
    if let Some(line) = cfg.ready_line {
        // No supported chip exposes anywhere near this many lines
        if line >= 512 {
            return Err(format!("ready_line {} out of range (0..=511)", line));
        }
    }
    Ok(())
}
