/*
 * Test utilities and fake collaborators for Cpldmon
 *
 * This module provides the scripted fakes used across test modules: an
 * in-memory register bus, a settable ready line, and a recording sink.
 */

#[cfg(test)]
pub mod test_utils {
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::rc::Rc;

    use crate::faults::FaultCategory;
    use crate::gpio::{InputLine, Level, LineError};
    use crate::i2c::{I2cError, RegisterBus};
    use crate::report::FaultSink;

    /// In-memory register file. Unset registers read as 0; individual
    /// registers can be scripted to fail; writes are recorded.
    pub struct FakeBus {
        registers: RefCell<HashMap<u8, u8>>,
        failing_reads: RefCell<HashSet<u8>>,
        fail_writes: Cell<bool>,
        writes: RefCell<Vec<(u8, u8)>>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            FakeBus {
                registers: RefCell::new(HashMap::new()),
                failing_reads: RefCell::new(HashSet::new()),
                fail_writes: Cell::new(false),
                writes: RefCell::new(Vec::new()),
            }
        }

        pub fn set(&self, reg: u8, value: u8) {
            self.registers.borrow_mut().insert(reg, value);
        }

        pub fn fail_read(&self, reg: u8) {
            self.failing_reads.borrow_mut().insert(reg);
        }

        pub fn fail_writes(&self) {
            self.fail_writes.set(true);
        }

        pub fn writes(&self) -> Vec<(u8, u8)> {
            self.writes.borrow().clone()
        }
    }

    impl RegisterBus for FakeBus {
        fn read_byte(&self, reg: u8) -> Result<u8, I2cError> {
            if self.failing_reads.borrow().contains(&reg) {
                return Err(I2cError::Io {
                    reg,
                    source: io::Error::new(io::ErrorKind::Other, "scripted failure"),
                });
            }
            Ok(*self.registers.borrow().get(&reg).unwrap_or(&0))
        }

        fn write_byte(&self, reg: u8, value: u8) -> Result<(), I2cError> {
            if self.fail_writes.get() {
                return Err(I2cError::Io {
                    reg,
                    source: io::Error::new(io::ErrorKind::Other, "scripted failure"),
                });
            }
            // Record only; the scripted register file models a fault that
            // persists across acks
            self.writes.borrow_mut().push((reg, value));
            Ok(())
        }
    }

    /// Ready line with a settable level.
    pub struct FixedLine {
        level: Cell<Level>,
    }

    impl FixedLine {
        pub fn low() -> Self {
            FixedLine {
                level: Cell::new(Level::Low),
            }
        }

        pub fn high() -> Self {
            FixedLine {
                level: Cell::new(Level::High),
            }
        }

        pub fn set(&self, level: Level) {
            self.level.set(level);
        }
    }

    impl InputLine for FixedLine {
        fn read_level(&self) -> Result<Level, LineError> {
            Ok(self.level.get())
        }
    }

    /// Sink that records every reported category, shareable with the
    /// test body through [`RecordingSink::handle`].
    pub struct RecordingSink {
        reports: Rc<RefCell<Vec<FaultCategory>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            RecordingSink {
                reports: Rc::new(RefCell::new(Vec::new())),
            }
        }

        pub fn handle(&self) -> Rc<RefCell<Vec<FaultCategory>>> {
            Rc::clone(&self.reports)
        }
    }

    impl FaultSink for RecordingSink {
        fn report(&mut self, category: FaultCategory) {
            self.reports.borrow_mut().push(category);
        }
    }
}
