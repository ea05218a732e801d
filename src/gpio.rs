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

//! The sequencer's ready/PGOOD digital line, read through the Linux GPIO
//! character device. One line, input direction, sampled once per poll.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioctl_code(direction: u32, kind: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const fn iorw<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ | IOC_WRITE, kind, nr, std::mem::size_of::<T>())
}

const GPIO_IOC_MAGIC: u8 = 0xB4;

const GPIO_HANDLES_MAX: usize = 64;
const GPIO_CONSUMER_LABEL_LEN: usize = 32;

const GPIOHANDLE_REQUEST_INPUT: u32 = 1 << 0;

// Kernel ABI struct; only `fd` is read back after the ioctl.
#[allow(dead_code)]
#[repr(C)]
struct GpioHandleRequest {
    lineoffsets: [u32; GPIO_HANDLES_MAX],
    flags: u32,
    default_values: [u8; GPIO_HANDLES_MAX],
    consumer_label: [u8; GPIO_CONSUMER_LABEL_LEN],
    lines: u32,
    fd: libc::c_int,
}

#[repr(C)]
struct GpioHandleData {
    values: [u8; GPIO_HANDLES_MAX],
}

const GPIO_GET_LINEHANDLE_IOCTL: libc::c_ulong = iorw::<GpioHandleRequest>(GPIO_IOC_MAGIC, 0x03);
const GPIOHANDLE_GET_LINE_VALUES_IOCTL: libc::c_ulong = iorw::<GpioHandleData>(GPIO_IOC_MAGIC, 0x08);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Error, Debug)]
pub enum LineError {
    #[error("unable to open {chip}: {source}")]
    Open { chip: String, source: io::Error },
    #[error("line handle request failed for line {line}: {source}")]
    Request { line: u32, source: io::Error },
    #[error("line value read failed: {source}")]
    Read { source: io::Error },
}

/// The ready-line seam the fault state machine sees.
#[cfg_attr(test, mockall::automock)]
pub trait InputLine {
    fn read_level(&self) -> Result<Level, LineError>;
}

struct Fd(RawFd);

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

/// One named input line on a GPIO character device. Chip and handle fds
/// are opened per read and closed before returning.
pub struct GpioLine {
    chip: String,
    line: u32,
}

impl GpioLine {
    pub fn new(chip: &str, line: u32) -> Self {
        GpioLine {
            chip: chip.to_string(),
            line,
        }
    }

    fn request_handle(&self) -> Result<Fd, LineError> {
        let path = CString::new(self.chip.as_str()).map_err(|_| LineError::Open {
            chip: self.chip.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "bad chip path"),
        })?;
        let chip_fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
        if chip_fd < 0 {
            return Err(LineError::Open {
                chip: self.chip.clone(),
                source: io::Error::last_os_error(),
            });
        }
        let chip_fd = Fd(chip_fd);

        let mut req: GpioHandleRequest = unsafe { std::mem::zeroed() };
        req.lineoffsets[0] = self.line;
        req.flags = GPIOHANDLE_REQUEST_INPUT;
        req.lines = 1;
        for (dst, src) in req.consumer_label.iter_mut().zip(b"cpldmon\0".iter()) {
            *dst = *src;
        }

        if unsafe { libc::ioctl(chip_fd.0, GPIO_GET_LINEHANDLE_IOCTL, &mut req) } < 0 {
            return Err(LineError::Request {
                line: self.line,
                source: io::Error::last_os_error(),
            });
        }
        Ok(Fd(req.fd))
    }
}

impl InputLine for GpioLine {
    fn read_level(&self) -> Result<Level, LineError> {
        let handle = self.request_handle()?;
        let mut data: GpioHandleData = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(handle.0, GPIOHANDLE_GET_LINE_VALUES_IOCTL, &mut data) } < 0 {
            return Err(LineError::Read {
                source: io::Error::last_os_error(),
            });
        }
        Ok(if data.values[0] == 0 {
            Level::Low
        } else {
            Level::High
        })
    }
}
