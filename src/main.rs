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

mod i2c;
mod gpio;
mod registers;
mod faults;
mod decode;
mod monitor;
mod report;
mod config;
mod service;
mod logger;

#[cfg(test)]
mod test_utils;

use std::path::PathBuf;

fn usage() -> ! {
    eprintln!("Usage: cpldmon [--config <path>] [--logging] (--service | --on-failure)");
    eprintln!();
    eprintln!("  --service     poll the CPLD for new faults until stopped");
    eprintln!("  --on-failure  decode and report the root cause of a known failure, once");
    eprintln!("  --config      read config from <path> instead of /etc/cpldmon/config.json");
    eprintln!("  --logging     append JSON events to /etc/cpldmon/logs.json");
    std::process::exit(2);
}

fn main() -> anyhow::Result<()> {
    // The I2C and GPIO device nodes are root-owned on every supported board
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("Error: cpldmon requires root privileges to reach the CPLD bus.");
        eprintln!(
            "Please run with: sudo {}",
            std::env::args().next().unwrap_or_else(|| "cpldmon".to_string())
        );
        std::process::exit(1);
    }

    let args: Vec<String> = std::env::args().collect();

    let logging_enabled = args.iter().any(|a| a == "--logging");
    if logging_enabled {
        logger::init_logging();
        logger::log_event(
            "startup",
            serde_json::json!({
                "args": args,
            }),
        );
    }

    let config_file = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_file);

    if args.iter().any(|a| a == "--on-failure") {
        if logging_enabled {
            logger::log_event("on_failure_pass", serde_json::json!({}));
        }
        return service::run_on_failure(&cfg);
    }

    if args.iter().any(|a| a == "--service") {
        if logging_enabled {
            logger::log_event("service_start", serde_json::json!({}));
        }
        return service::run_service(&cfg);
    }

    usage();
}
