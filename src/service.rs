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

//! The hosting loop: builds the production monitor from config and
//! drives `analyze()` on the poll heartbeat. Faults never break the
//! loop; only a rejected configuration does.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::config::MonitorConfig;
use crate::gpio::GpioLine;
use crate::i2c::CpldBus;
use crate::monitor::CpldMonitor;
use crate::registers::{self, RegisterMap};
use crate::report::LogSink;

/// Resolve the variant's register map with any config overrides applied.
pub fn resolve_map(cfg: &MonitorConfig) -> RegisterMap {
    let mut map = cfg.variant.register_map();
    if let Some(bus_id) = cfg.bus_id {
        map.bus_id = bus_id;
    }
    map
}

fn build_monitor(cfg: &MonitorConfig) -> CpldMonitor<CpldBus, GpioLine, LogSink> {
    let map = resolve_map(cfg);
    let bus = CpldBus::new(map.bus_id, map.device_addr);
    let chip = cfg
        .gpio_chip
        .as_deref()
        .unwrap_or(registers::READY_GPIO_CHIP);
    let line = GpioLine::new(chip, cfg.ready_line.unwrap_or(registers::READY_GPIO_LINE));
    CpldMonitor::with_map(map, bus, line, LogSink)
}

/// Periodic monitoring mode.
pub fn run_service(cfg: &MonitorConfig) -> Result<()> {
    crate::config::validate_config(cfg).map_err(|e| anyhow!("invalid config: {}", e))?;

    eprintln!(
        "cpldmon: starting service mode ({:?}, bus {}, every {}ms)",
        cfg.variant,
        resolve_map(cfg).bus_id,
        cfg.poll_interval_ms
    );

    let mut monitor = build_monitor(cfg);

    let interval = Duration::from_millis(cfg.poll_interval_ms);
    let mut last = Instant::now() - interval;

    loop {
        let now = Instant::now();
        if now.duration_since(last) < interval {
            thread::sleep(Duration::from_millis(50));
            continue;
        }
        last = now;

        monitor.analyze();
    }
}

/// One immediate root-cause pass, for invocation by the framework that
/// detected the sequencer failure.
pub fn run_on_failure(cfg: &MonitorConfig) -> Result<()> {
    crate::config::validate_config(cfg).map_err(|e| anyhow!("invalid config: {}", e))?;
    let mut monitor = build_monitor(cfg);
    monitor.on_failure();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::BoardVariant;

    #[test]
    fn test_resolve_map_applies_bus_override() {
        let mut cfg = MonitorConfig::default();
        assert_eq!(resolve_map(&cfg).bus_id, 11);
        cfg.bus_id = Some(9);
        assert_eq!(resolve_map(&cfg).bus_id, 9);
    }

    #[test]
    fn test_resolve_map_keeps_variant_registers() {
        let cfg = MonitorConfig {
            variant: BoardVariant::StorageBay,
            ..MonitorConfig::default()
        };
        let map = resolve_map(&cfg);
        assert_eq!(map.bus_id, 3);
        assert!(map.bay_fault.is_some());
    }

    #[test]
    fn test_run_service_rejects_invalid_interval() {
        let cfg = MonitorConfig {
            poll_interval_ms: 1,
            ..MonitorConfig::default()
        };
        assert!(run_service(&cfg).is_err());
    }
}
