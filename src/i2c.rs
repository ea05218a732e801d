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

//! Single-byte register access to the CPLD over the Linux I2C character
//! device, using the SMBus byte-data transfer ioctl.
//!
//! Every transaction opens the bus, addresses the slave, transfers one
//! byte, and closes the bus again. The CPLD sits alone behind its
//! sequencer-facing link, so there is nothing to gain from keeping the
//! node open between polls, and a fresh open per transaction means a
//! wedged prior transfer cannot leak into the next one.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

const I2C_SLAVE_FORCE: libc::c_ulong = 0x0706;
const I2C_FUNCS: libc::c_ulong = 0x0705;
const I2C_SMBUS: libc::c_ulong = 0x0720;

const I2C_FUNC_SMBUS_READ_BYTE_DATA: libc::c_ulong = 0x0008_0000;
const I2C_FUNC_SMBUS_WRITE_BYTE_DATA: libc::c_ulong = 0x0010_0000;

const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_BYTE_DATA: u32 = 2;

// Large enough for block transfers (32 data bytes + length + PEC); the
// kernel insists on the full-size buffer even for byte-data transfers.
const I2C_SMBUS_DATA_SIZE: usize = 34;

// Kernel ABI union; `word` exists only to pin the layout.
#[allow(dead_code)]
#[repr(C)]
union I2cSmbusData {
    byte: u8,
    word: u16,
    block: [u8; I2C_SMBUS_DATA_SIZE],
}

#[repr(C)]
struct I2cSmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut I2cSmbusData,
}

#[derive(Error, Debug)]
pub enum I2cError {
    #[error("unable to open {device}: {source}")]
    Open { device: String, source: io::Error },
    #[error("bus configuration failed: {0}")]
    Config(String),
    #[error("SMBus transfer failed at register 0x{reg:02x}: {source}")]
    Io { reg: u8, source: io::Error },
}

/// One open I2C character device, addressed to a single slave.
/// Closed on drop; never held across poll cycles.
pub struct I2cDevice {
    fd: RawFd,
    funcs: libc::c_ulong,
}

impl I2cDevice {
    /// Open `/dev/i2c-<bus_id>` and address `addr`, probing the adapter
    /// functionality mask up front so per-register calls can refuse
    /// transfers the adapter cannot perform.
    pub fn open(bus_id: u32, addr: u16) -> Result<Self, I2cError> {
        let device = format!("/dev/i2c-{}", bus_id);
        let path = CString::new(device.as_str())
            .map_err(|_| I2cError::Config(format!("bad device path {}", device)))?;

        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(I2cError::Open {
                device,
                source: io::Error::last_os_error(),
            });
        }
        // Wrap immediately so the fd is closed on every early return.
        let mut dev = I2cDevice { fd, funcs: 0 };

        if unsafe { libc::ioctl(dev.fd, I2C_SLAVE_FORCE, addr as libc::c_ulong) } < 0 {
            return Err(I2cError::Config(format!(
                "cannot address slave 0x{:02x}: {}",
                addr,
                io::Error::last_os_error()
            )));
        }

        let mut funcs: libc::c_ulong = 0;
        if unsafe { libc::ioctl(dev.fd, I2C_FUNCS, &mut funcs) } < 0 {
            return Err(I2cError::Config(format!(
                "I2C_FUNCS query failed: {}",
                io::Error::last_os_error()
            )));
        }
        dev.funcs = funcs;
        Ok(dev)
    }

    fn smbus_transfer(&self, read_write: u8, reg: u8, data: &mut I2cSmbusData) -> Result<(), I2cError> {
        let mut args = I2cSmbusIoctlData {
            read_write,
            command: reg,
            size: I2C_SMBUS_BYTE_DATA,
            data,
        };
        if unsafe { libc::ioctl(self.fd, I2C_SMBUS, &mut args) } < 0 {
            return Err(I2cError::Io {
                reg,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn read_byte(&self, reg: u8) -> Result<u8, I2cError> {
        if self.funcs & I2C_FUNC_SMBUS_READ_BYTE_DATA == 0 {
            return Err(I2cError::Config(
                "adapter lacks SMBus read-byte-data".to_string(),
            ));
        }
        let mut data = I2cSmbusData {
            block: [0; I2C_SMBUS_DATA_SIZE],
        };
        self.smbus_transfer(I2C_SMBUS_READ, reg, &mut data)?;
        Ok(unsafe { data.byte })
    }

    pub fn write_byte(&self, reg: u8, value: u8) -> Result<(), I2cError> {
        if self.funcs & I2C_FUNC_SMBUS_WRITE_BYTE_DATA == 0 {
            return Err(I2cError::Config(
                "adapter lacks SMBus write-byte-data".to_string(),
            ));
        }
        let mut data = I2cSmbusData {
            block: [0; I2C_SMBUS_DATA_SIZE],
        };
        data.byte = value;
        self.smbus_transfer(I2C_SMBUS_WRITE, reg, &mut data)
    }
}

impl Drop for I2cDevice {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// The register-access seam the fault state machine sees. Production code
/// goes through [`CpldBus`]; tests substitute a scripted fake or a mock.
#[cfg_attr(test, mockall::automock)]
pub trait RegisterBus {
    fn read_byte(&self, reg: u8) -> Result<u8, I2cError>;
    fn write_byte(&self, reg: u8, value: u8) -> Result<(), I2cError>;
}

/// Bus + slave coordinates for the CPLD. Opens the device fresh for every
/// transaction (see module docs).
pub struct CpldBus {
    bus_id: u32,
    addr: u16,
}

impl CpldBus {
    pub fn new(bus_id: u32, addr: u16) -> Self {
        CpldBus { bus_id, addr }
    }
}

impl RegisterBus for CpldBus {
    fn read_byte(&self, reg: u8) -> Result<u8, I2cError> {
        I2cDevice::open(self.bus_id, self.addr)?.read_byte(reg)
    }

    fn write_byte(&self, reg: u8, value: u8) -> Result<(), I2cError> {
        I2cDevice::open(self.bus_id, self.addr)?.write_byte(reg, value)
    }
}

/// Outcome of a register read under the soft-fail policy.
///
/// The monitor never aborts a poll cycle on a bus error; it proceeds with
/// the sentinel value 0 ("no fault detected"). Keeping `Failed` distinct
/// from `Value(0)` lets callers and tests tell a dead bus apart from a
/// genuinely clear register even though every current decision point
/// collapses them through [`ReadOutcome::value_or_zero`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Value(u8),
    Failed,
}

impl ReadOutcome {
    pub fn value_or_zero(self) -> u8 {
        match self {
            ReadOutcome::Value(v) => v,
            ReadOutcome::Failed => 0,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, ReadOutcome::Failed)
    }
}
