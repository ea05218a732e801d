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

//! The closed set of reportable fault categories and the per-board
//! error-code tables that select them.
//!
//! The CPLD reports the root cause of a power fault as a small integer
//! in its error-code registers. The table is fixed by the CPLD image:
//! codes 1..=35 are shared between boards, code 170 is the combined
//! PSU0+PSU1 PGOOD failure on both, and codes 36..=38 exist only on the
//! storage-bay board. Anything else, including 0, means the register
//! could not be read or holds garbage, and is reported as
//! [`FaultCategory::UnreadableErrorCode`].

use crate::registers::BoardVariant;

/// One reportable fault condition. The set is closed; the sink receives
/// nothing outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory {
    /// The error-code register read failed or held an unknown value.
    UnreadableErrorCode,

    Psu1PowerGood,
    Psu0PowerGood,

    // 240Va distribution rails. Letter I is unused on the board.
    Rail240VaA,
    Rail240VaB,
    Rail240VaC,
    Rail240VaD,
    Rail240VaE,
    Rail240VaF,
    Rail240VaG,
    Rail240VaH,
    Rail240VaJ,
    Rail240VaK,
    Rail240VaL,

    P5vPowerGood,
    P3v3PowerGood,
    P1v8PowerGood,
    P1v1PowerGood,
    P0v9PowerGood,
    P2v5aPowerGood,
    P2v5bPowerGood,
    Vdn0PowerGood,
    Vdn1PowerGood,
    P1v5PowerGood,
    Vio0PowerGood,
    Vio1PowerGood,
    Vdd0PowerGood,
    Vcs0PowerGood,
    Vdd1PowerGood,
    Vcs1PowerGood,
    Vddr0PowerGood,
    Vtt0PowerGood,
    Vddr1PowerGood,
    Vtt1PowerGood,
    Gpu0PowerGood,
    Gpu1PowerGood,

    /// Both supplies lost PGOOD at once; the CPLD latches this as a
    /// single combined code rather than two.
    Psu0Psu1PowerGood,

    // Rails present only on the storage-bay board.
    P1v35PowerGood,
    P1v2PowerGood,
    P0v92PowerGood,

    // Storage-bay conditions, decoded from their own registers rather
    // than the error-code table.
    Bay0Fault,
    Bay1Fault,
    Bay0Rebuilding,
    Bay1Rebuilding,
    BayRebuildEnded,
}

impl FaultCategory {
    /// Stable identifier used by the reporting sink and the event log.
    pub fn name(self) -> &'static str {
        use FaultCategory::*;
        match self {
            UnreadableErrorCode => "fault_register_unreadable",
            Psu1PowerGood => "psu1_pgood",
            Psu0PowerGood => "psu0_pgood",
            Rail240VaA => "240va_rail_a",
            Rail240VaB => "240va_rail_b",
            Rail240VaC => "240va_rail_c",
            Rail240VaD => "240va_rail_d",
            Rail240VaE => "240va_rail_e",
            Rail240VaF => "240va_rail_f",
            Rail240VaG => "240va_rail_g",
            Rail240VaH => "240va_rail_h",
            Rail240VaJ => "240va_rail_j",
            Rail240VaK => "240va_rail_k",
            Rail240VaL => "240va_rail_l",
            P5vPowerGood => "p5v_pgood",
            P3v3PowerGood => "p3v3_pgood",
            P1v8PowerGood => "p1v8_pgood",
            P1v1PowerGood => "p1v1_pgood",
            P0v9PowerGood => "p0v9_pgood",
            P2v5aPowerGood => "p2v5a_pgood",
            P2v5bPowerGood => "p2v5b_pgood",
            Vdn0PowerGood => "vdn0_pgood",
            Vdn1PowerGood => "vdn1_pgood",
            P1v5PowerGood => "p1v5_pgood",
            Vio0PowerGood => "vio0_pgood",
            Vio1PowerGood => "vio1_pgood",
            Vdd0PowerGood => "vdd0_pgood",
            Vcs0PowerGood => "vcs0_pgood",
            Vdd1PowerGood => "vdd1_pgood",
            Vcs1PowerGood => "vcs1_pgood",
            Vddr0PowerGood => "vddr0_pgood",
            Vtt0PowerGood => "vtt0_pgood",
            Vddr1PowerGood => "vddr1_pgood",
            Vtt1PowerGood => "vtt1_pgood",
            Gpu0PowerGood => "gpu0_pgood",
            Gpu1PowerGood => "gpu1_pgood",
            Psu0Psu1PowerGood => "psu0_psu1_pgood",
            P1v35PowerGood => "p1v35_pgood",
            P1v2PowerGood => "p1v2_pgood",
            P0v92PowerGood => "p0v92_pgood",
            Bay0Fault => "bay0_fault",
            Bay1Fault => "bay1_fault",
            Bay0Rebuilding => "bay0_rebuild_started",
            Bay1Rebuilding => "bay1_rebuild_started",
            BayRebuildEnded => "bay_rebuild_ended",
        }
    }
}

/// Map a raw error-code register value to its category. Total over the
/// whole input domain; unknown codes collapse to
/// [`FaultCategory::UnreadableErrorCode`].
///
/// The 170 entry is a literal table row, not a computed alias: the CPLD
/// image emits 0xAA for the combined-PSU failure and nothing else above
/// the contiguous range.
pub fn map_error_code(variant: BoardVariant, raw: u8) -> FaultCategory {
    use FaultCategory::*;
    match raw {
        1 => Psu1PowerGood,
        2 => Psu0PowerGood,
        3 => Rail240VaA,
        4 => Rail240VaB,
        5 => Rail240VaC,
        6 => Rail240VaD,
        7 => Rail240VaE,
        8 => Rail240VaF,
        9 => Rail240VaG,
        10 => Rail240VaH,
        11 => Rail240VaJ,
        12 => Rail240VaK,
        13 => Rail240VaL,
        14 => P5vPowerGood,
        15 => P3v3PowerGood,
        16 => P1v8PowerGood,
        17 => P1v1PowerGood,
        18 => P0v9PowerGood,
        19 => P2v5aPowerGood,
        20 => P2v5bPowerGood,
        21 => Vdn0PowerGood,
        22 => Vdn1PowerGood,
        23 => P1v5PowerGood,
        24 => Vio0PowerGood,
        25 => Vio1PowerGood,
        26 => Vdd0PowerGood,
        27 => Vcs0PowerGood,
        28 => Vdd1PowerGood,
        29 => Vcs1PowerGood,
        30 => Vddr0PowerGood,
        31 => Vtt0PowerGood,
        32 => Vddr1PowerGood,
        33 => Vtt1PowerGood,
        34 => Gpu0PowerGood,
        35 => Gpu1PowerGood,
        170 => Psu0Psu1PowerGood,
        36 if variant == BoardVariant::StorageBay => P1v35PowerGood,
        37 if variant == BoardVariant::StorageBay => P1v2PowerGood,
        38 if variant == BoardVariant::StorageBay => P0v92PowerGood,
        _ => UnreadableErrorCode,
    }
}
