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

//! Board-variant register maps for the sequencer CPLD.
//!
//! Both supported boards expose the same CPLD at slave 0x40 but hang it
//! off different host buses, and only the storage-bay board wires the
//! bay fault/rebuild registers. The fault engine is variant-agnostic;
//! everything board-specific lives in the [`RegisterMap`] it is built
//! with.

use serde::{Deserialize, Serialize};

/// CPLD slave address, common to both boards.
pub const CPLD_SLAVE_ADDR: u16 = 0x40;

/// SMLink status register: PSU PGOOD bits (bits 1 and 2).
pub const PSU_STATUS_REG: u8 = 0x05;

/// SMLink status register: latched fault-interrupt bits.
pub const INTERRUPT_CONTROL_REG: u8 = 0x20;

/// SMLink status register: power-on error code.
pub const POWER_ON_CODE_REG: u8 = 0x21;

/// SMLink status register: power-ready error code.
pub const POWER_READY_CODE_REG: u8 = 0x22;

/// SMLink status register: bay fault bits (storage-bay board only).
pub const BAY_FAULT_REG: u8 = 0x40;

/// SMLink status register: bay rebuild bits (storage-bay board only).
pub const BAY_REBUILD_REG: u8 = 0x43;

/// Value written to the interrupt-control register to acknowledge and
/// release the latch.
pub const INTERRUPT_ACK: u8 = 0x01;

/// GPIO chip and line carrying the sequencer's rail-ready signal.
pub const READY_GPIO_CHIP: &str = "/dev/gpiochip0";
pub const READY_GPIO_LINE: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardVariant {
    /// Base board: CPLD on bus 11, no bay hardware.
    Standard,
    /// Storage-bay board: CPLD on bus 3, bay fault/rebuild registers
    /// present, three extra rail error codes.
    StorageBay,
}

/// How the power-ready fault class suppresses duplicate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPolicy {
    /// One report per contiguous span of the ready line reading low.
    OneShot,
    /// The mask remembers the reported code; a different code observed
    /// while the line is still low is a new report.
    CodeKeyed,
}

#[derive(Debug, Clone)]
pub struct RegisterMap {
    pub variant: BoardVariant,
    pub bus_id: u32,
    pub device_addr: u16,
    pub psu_status: u8,
    pub interrupt_control: u8,
    pub power_on_code: u8,
    pub power_ready_code: u8,
    pub bay_fault: Option<u8>,
    pub bay_rebuild: Option<u8>,
    pub interrupt_ack: u8,
    pub mask_policy: MaskPolicy,
    /// Gate the on-failure interrupt clear on a PSU reporting good.
    pub guard_clear_on_failure: bool,
    /// Gate the analyze-path interrupt clear the same way.
    pub guard_clear_on_analyze: bool,
}

impl BoardVariant {
    pub fn register_map(self) -> RegisterMap {
        match self {
            BoardVariant::Standard => RegisterMap {
                variant: self,
                bus_id: 11,
                device_addr: CPLD_SLAVE_ADDR,
                psu_status: PSU_STATUS_REG,
                interrupt_control: INTERRUPT_CONTROL_REG,
                power_on_code: POWER_ON_CODE_REG,
                power_ready_code: POWER_READY_CODE_REG,
                bay_fault: None,
                bay_rebuild: None,
                interrupt_ack: INTERRUPT_ACK,
                mask_policy: MaskPolicy::CodeKeyed,
                guard_clear_on_failure: true,
                guard_clear_on_analyze: false,
            },
            BoardVariant::StorageBay => RegisterMap {
                variant: self,
                bus_id: 3,
                device_addr: CPLD_SLAVE_ADDR,
                psu_status: PSU_STATUS_REG,
                interrupt_control: INTERRUPT_CONTROL_REG,
                power_on_code: POWER_ON_CODE_REG,
                power_ready_code: POWER_READY_CODE_REG,
                bay_fault: Some(BAY_FAULT_REG),
                bay_rebuild: Some(BAY_REBUILD_REG),
                interrupt_ack: INTERRUPT_ACK,
                mask_policy: MaskPolicy::OneShot,
                guard_clear_on_failure: true,
                guard_clear_on_analyze: true,
            },
        }
    }

    pub fn has_bay_hardware(self) -> bool {
        matches!(self, BoardVariant::StorageBay)
    }
}
