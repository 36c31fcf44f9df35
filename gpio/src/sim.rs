//! Simulated board for running the LCD drivers without hardware.
//!
//! A [SimBoard] hands out outputs and a clock that all record into one shared event log, in the
//! order the driver used them. Tests can then check the exact pin sequence, the current level of
//! every line, or the bytes the controller would have latched.
//!
//! Not thread-safe, just like the drivers using it.

use crate::clock::Clock;
use crate::lcd::hd44780::driver::{ControlPins, DataPins, GpioHD44780Driver};
use crate::{GpioError, GpioOutput, GpioResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// A line of the simulated parallel bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SimLine {
    Rs,
    Rw,
    E,
    /// Data line `D0`..`D7`.
    Data(u8),
}

impl SimLine {
    /// All eleven lines, in the order [crate::lcd::hd44780::driver::HD44780Driver::all_off]
    /// drives them.
    pub const ALL: [SimLine; 11] = [
        SimLine::Rs,
        SimLine::Rw,
        SimLine::E,
        SimLine::Data(0),
        SimLine::Data(1),
        SimLine::Data(2),
        SimLine::Data(3),
        SimLine::Data(4),
        SimLine::Data(5),
        SimLine::Data(6),
        SimLine::Data(7),
    ];
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SimEvent {
    /// A successful write of a level to a line.
    Write(SimLine, bool),
    Sleep(Duration),
}

#[derive(Debug, Default)]
struct SimState {
    events: Vec<SimEvent>,
    levels: HashMap<SimLine, bool>,
    writes: HashMap<SimLine, usize>,
    /// Line that starts failing once it has been written the given number of times.
    failing: Option<(SimLine, usize)>,
}

#[derive(Clone, Debug, Default)]
pub struct SimBoard {
    state: Rc<RefCell<SimState>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an output recording into this board.
    pub fn output(&self, line: SimLine) -> Box<dyn GpioOutput> {
        Box::new(SimOutput {
            line,
            state: Rc::clone(&self.state),
        })
    }

    pub fn clock(&self) -> Box<dyn Clock> {
        Box::new(SimClock {
            state: Rc::clone(&self.state),
        })
    }

    pub fn control_pins(&self) -> ControlPins<'static> {
        ControlPins::new(
            self.output(SimLine::Rs),
            self.output(SimLine::Rw),
            self.output(SimLine::E),
        )
    }

    pub fn data_pins(&self) -> DataPins<'static> {
        DataPins::new(std::array::from_fn(|i| self.output(SimLine::Data(i as u8))))
    }

    /// Gets an HD44780 driver with default settings wired to this board.
    pub fn driver(&self) -> GpioHD44780Driver<'static> {
        GpioHD44780Driver::new(self.control_pins(), self.data_pins(), self.clock())
    }

    /// Makes every write to `line` fail from now on.
    pub fn fail_writes_to(&self, line: SimLine) {
        self.fail_writes_after(line, 0);
    }

    /// Makes writes to `line` fail once `successful` more writes to it have gone through.
    pub fn fail_writes_after(&self, line: SimLine, successful: usize) {
        let mut state = self.state.borrow_mut();
        let done = state.writes.get(&line).copied().unwrap_or(0);
        state.failing = Some((line, done + successful));
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Gets the current level of a line. Lines never written are low.
    pub fn level(&self, line: SimLine) -> bool {
        self.state.borrow().levels.get(&line).copied().unwrap_or(false)
    }

    /// Gets the byte currently on the data lines, `D0` as the least significant bit.
    pub fn data_byte(&self) -> u8 {
        (0..8).fold(0, |byte, i| {
            if self.level(SimLine::Data(i)) {
                byte | (1 << i)
            } else {
                byte
            }
        })
    }

    pub fn sleeps(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, SimEvent::Sleep(_)))
            .count()
    }

    /// Replays the log and returns what the controller latched on every falling edge of E, as
    /// `(rs, byte)` pairs.
    pub fn latched(&self) -> Vec<(bool, u8)> {
        let state = self.state.borrow();
        let mut levels: HashMap<SimLine, bool> = HashMap::new();
        let mut latched = Vec::new();

        for event in &state.events {
            let SimEvent::Write(line, value) = *event else {
                continue;
            };
            let was_high = levels.insert(line, value).unwrap_or(false);
            if line == SimLine::E && was_high && !value {
                let rs = levels.get(&SimLine::Rs).copied().unwrap_or(false);
                let byte = (0..8).fold(0u8, |byte, i| {
                    if levels.get(&SimLine::Data(i)).copied().unwrap_or(false) {
                        byte | (1 << i)
                    } else {
                        byte
                    }
                });
                latched.push((rs, byte));
            }
        }

        latched
    }

    /// Gets the characters latched with RS high, as text.
    pub fn latched_text(&self) -> String {
        self.latched()
            .into_iter()
            .filter(|&(rs, _)| rs)
            .map(|(_, byte)| char::from(byte))
            .collect()
    }
}

#[derive(Debug)]
struct SimOutput {
    line: SimLine,
    state: Rc<RefCell<SimState>>,
}

impl GpioOutput for SimOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        let mut state = self.state.borrow_mut();
        let written = state.writes.get(&self.line).copied().unwrap_or(0);
        if let Some((line, limit)) = state.failing {
            if line == self.line && written >= limit {
                return Err(GpioError::Other(format!("simulated failure on {:?}", self.line)));
            }
        }
        state.writes.insert(self.line, written + 1);
        state.levels.insert(self.line, value);
        state.events.push(SimEvent::Write(self.line, value));
        Ok(())
    }
}

#[derive(Debug)]
struct SimClock {
    state: Rc<RefCell<SimState>>,
}

impl Clock for SimClock {
    fn sleep(&self, duration: Duration) {
        self.state.borrow_mut().events.push(SimEvent::Sleep(duration));
    }
}
