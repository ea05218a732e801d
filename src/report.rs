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

//! The reporting seam. The state machine hands over one category per
//! distinct fault; how often that happens is bounded by the masking
//! logic, not by the sink.

use serde_json::json;

use crate::faults::FaultCategory;
use crate::logger;

#[cfg_attr(test, mockall::automock)]
pub trait FaultSink {
    fn report(&mut self, category: FaultCategory);
}

/// Production sink: stderr diagnostic plus a JSON event line.
pub struct LogSink;

impl FaultSink for LogSink {
    fn report(&mut self, category: FaultCategory) {
        eprintln!("cpldmon: fault reported: {}", category.name());
        logger::log_event(
            "fault_reported",
            json!({
                "category": category.name(),
            }),
        );
    }
}
