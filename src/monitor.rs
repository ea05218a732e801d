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

//! The fault state machine.
//!
//! One [`CpldMonitor`] owns the masks for one device and is driven
//! serially by the hosting framework: `on_failure` when the host already
//! knows the sequencer failed and wants the root cause logged now,
//! `analyze` as the periodic heartbeat that must stay silent while
//! nothing changes.
//!
//! Per fault class the machine is two states, Idle and Reported. A
//! class moves to Reported the poll it is first seen and emits exactly
//! one report on the way in; it moves back to Idle only when the
//! underlying condition is observed gone (ready line high, bay register
//! clear, or under code-keyed masking a different code). Reported to
//! Reported never emits.
//!
//! Every register access is soft-fail: a failed read decodes as 0 ("no
//! fault"), a failed write is logged and dropped, and the poll cycle
//! always runs to completion. Availability of the monitoring loop is
//! deliberately favored over fail-fast behavior on a sick bus.

use serde_json::json;

use crate::decode::{self, BayFault, BayRebuild};
use crate::faults::{self, FaultCategory};
use crate::gpio::{InputLine, Level};
use crate::i2c::{ReadOutcome, RegisterBus};
use crate::logger;
use crate::registers::{BoardVariant, MaskPolicy, RegisterMap};
use crate::report::FaultSink;

/// Mask state for the power-ready fault class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyMask {
    Idle,
    /// One-shot masking: something was reported this low span.
    Reported,
    /// Code-keyed masking: this code was reported and still stands.
    ReportedCode(u8),
}

pub struct CpldMonitor<B, L, S> {
    map: RegisterMap,
    bus: B,
    ready_line: L,
    sink: S,
    power_ready_mask: ReadyMask,
    bay_fault_reported: bool,
    bay_rebuild_reported: bool,
}

impl<B, L, S> CpldMonitor<B, L, S>
where
    B: RegisterBus,
    L: InputLine,
    S: FaultSink,
{
    pub fn new(variant: BoardVariant, bus: B, ready_line: L, sink: S) -> Self {
        Self::with_map(variant.register_map(), bus, ready_line, sink)
    }

    /// Build against an explicit register map (bus-id overrides, tests).
    pub fn with_map(map: RegisterMap, bus: B, ready_line: L, sink: S) -> Self {
        CpldMonitor {
            map,
            bus,
            ready_line,
            sink,
            power_ready_mask: ReadyMask::Idle,
            bay_fault_reported: false,
            bay_rebuild_reported: false,
        }
    }

    pub fn variant(&self) -> BoardVariant {
        self.map.variant
    }

    /// Immediate root-cause pass for a device the host already knows has
    /// failed. Always reports when the power-on interrupt bit is latched;
    /// no masking applies on this path.
    pub fn on_failure(&mut self) {
        let status = self.read_soft(self.map.interrupt_control).value_or_zero();
        if !decode::power_on_fault(status) {
            return;
        }
        let code = self.read_soft(self.map.power_on_code).value_or_zero();
        let category = faults::map_error_code(self.map.variant, code);
        self.sink.report(category);
        self.clear_interrupt(self.map.guard_clear_on_failure);
    }

    /// Periodic scan. Side-effect-free while nothing is wrong; reports a
    /// fault class at most once until its condition is observed gone.
    pub fn analyze(&mut self) {
        match self.ready_line.read_level() {
            Ok(Level::Low) => self.evaluate_power_ready(),
            Ok(Level::High) => {
                // Rails are back; re-arm detection for the next failure.
                self.power_ready_mask = ReadyMask::Idle;
            }
            Err(e) => {
                // Leave the mask untouched: without a line sample there is
                // no evidence the condition changed either way.
                eprintln!("cpldmon: ready line read failed: {}", e);
                logger::log_event(
                    "ready_line_read_failed",
                    json!({ "error": e.to_string() }),
                );
            }
        }

        if let Some(reg) = self.map.bay_fault {
            self.evaluate_bay_fault(reg);
        }
        if let Some(reg) = self.map.bay_rebuild {
            self.evaluate_bay_rebuild(reg);
        }
    }

    fn evaluate_power_ready(&mut self) {
        let status = self.read_soft(self.map.interrupt_control).value_or_zero();
        if !decode::power_ready_fault(status) {
            return;
        }
        let code = self.read_soft(self.map.power_ready_code).value_or_zero();

        let emit = match self.map.mask_policy {
            MaskPolicy::OneShot => self.power_ready_mask == ReadyMask::Idle,
            MaskPolicy::CodeKeyed => match self.power_ready_mask {
                ReadyMask::ReportedCode(prev) => prev != code,
                _ => true,
            },
        };
        if !emit {
            // Masked: suppress the report and the clear alike
            return;
        }

        let category = faults::map_error_code(self.map.variant, code);
        self.sink.report(category);
        self.power_ready_mask = match self.map.mask_policy {
            MaskPolicy::OneShot => ReadyMask::Reported,
            MaskPolicy::CodeKeyed => ReadyMask::ReportedCode(code),
        };
        self.clear_interrupt(self.map.guard_clear_on_analyze);
    }

    fn evaluate_bay_fault(&mut self, reg: u8) {
        let value = self.read_soft(reg).value_or_zero();
        match decode::bay_fault(value) {
            BayFault::Bay0 => {
                if !self.bay_fault_reported {
                    self.sink.report(FaultCategory::Bay0Fault);
                    self.bay_fault_reported = true;
                }
            }
            BayFault::Bay1 => {
                if !self.bay_fault_reported {
                    self.sink.report(FaultCategory::Bay1Fault);
                    self.bay_fault_reported = true;
                }
            }
            BayFault::None => {
                self.bay_fault_reported = false;
            }
        }
    }

    fn evaluate_bay_rebuild(&mut self, reg: u8) {
        let value = self.read_soft(reg).value_or_zero();
        match decode::bay_rebuild(value) {
            BayRebuild::Bay0Rebuilding => {
                if !self.bay_rebuild_reported {
                    self.sink.report(FaultCategory::Bay0Rebuilding);
                    self.bay_rebuild_reported = true;
                }
            }
            BayRebuild::Bay1Rebuilding => {
                if !self.bay_rebuild_reported {
                    self.sink.report(FaultCategory::Bay1Rebuilding);
                    self.bay_rebuild_reported = true;
                }
            }
            BayRebuild::Idle => {
                if self.bay_rebuild_reported {
                    // The masked rebuild finished; that transition is
                    // itself worth one report.
                    self.sink.report(FaultCategory::BayRebuildEnded);
                }
                self.bay_rebuild_reported = false;
            }
        }
    }

    /// Acknowledge the latched interrupt. When `guarded`, skip the write
    /// unless a PSU reports PGOOD: clearing while both supplies are down
    /// only lets the still-failing supply re-latch the same fault.
    fn clear_interrupt(&mut self, guarded: bool) {
        if guarded {
            let psu = self.read_soft(self.map.psu_status).value_or_zero();
            if !decode::psu_good(psu) {
                logger::log_event(
                    "interrupt_clear_skipped",
                    json!({ "psu_status": psu }),
                );
                return;
            }
        }
        match self
            .bus
            .write_byte(self.map.interrupt_control, self.map.interrupt_ack)
        {
            Ok(()) => {
                logger::log_event(
                    "interrupt_cleared",
                    json!({ "reg": self.map.interrupt_control }),
                );
            }
            Err(e) => {
                eprintln!("cpldmon: interrupt clear failed: {}", e);
                logger::log_event(
                    "interrupt_clear_failed",
                    json!({ "error": e.to_string() }),
                );
            }
        }
    }

    fn read_soft(&self, reg: u8) -> ReadOutcome {
        match self.bus.read_byte(reg) {
            Ok(v) => ReadOutcome::Value(v),
            Err(e) => {
                eprintln!("cpldmon: register 0x{:02x} read failed: {}", reg, e);
                logger::log_event(
                    "register_read_failed",
                    json!({ "reg": reg, "error": e.to_string() }),
                );
                ReadOutcome::Failed
            }
        }
    }
}
