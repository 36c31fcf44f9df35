//! GpiodDriver implementation driving GPIO lines through the Linux GPIO character device.
//!
//! Lines are requested from the kernel as outputs only; the LCD drivers in this crate never
//! read back.
use crate::{GpioActiveLevel, GpioDriver, GpioError, GpioOutput, GpioPin, GpioResult};
use bitvec::vec::BitVec;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// Tracks which lines of a chip have been handed out.
#[derive(Debug)]
struct LineClaims {
    used: BitVec<AtomicU8>,
}

impl LineClaims {
    fn new(count: usize) -> Self {
        LineClaims {
            used: BitVec::repeat(false, count),
        }
    }

    /// Marks `index` as handed out.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if `index` is not a line of the chip.
    /// - `GpioError::AlreadyInUse` if it has been claimed and not released yet.
    fn claim(&self, index: usize) -> GpioResult<()> {
        if index >= self.used.len() {
            return Err(GpioError::InvalidArgument);
        }

        if self.used[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used.set_aliased(index, true);
        Ok(())
    }

    fn release(&self, index: usize) {
        if index < self.used.len() {
            self.used.set_aliased(index, false);
        }
    }
}

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO pins.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_pins: LineClaims,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        Self {
            chip,
            used_pins: LineClaims::new(n),
        }
    }

    /// Opens the GPIO chip at `path`, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(path.as_ref())?;
        debug!("Opened {} with {} lines", chip.name(), chip.num_lines());
        Ok(Self::new(chip))
    }

    fn request_output(
        &self,
        pin_index: usize,
        active_level: GpioActiveLevel,
    ) -> GpioResult<gpiod::Lines<gpiod::Output>> {
        let line = self.chip.request_lines(
            gpiod::Options::output([pin_index as u32])
                .consumer(env!("CARGO_PKG_NAME"))
                .active(active_level.into()),
        )?;
        Ok(line)
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.used_pins.claim(index)?;

        Ok(Box::new(GpiodPin {
            driver: self,
            pin_index: index,
            active_level: GpioActiveLevel::High,
        }))
    }
}

impl From<GpioActiveLevel> for gpiod::Active {
    fn from(level: GpioActiveLevel) -> Self {
        match level {
            GpioActiveLevel::High => gpiod::Active::High,
            GpioActiveLevel::Low => gpiod::Active::Low,
        }
    }
}

struct GpiodPin<'a> {
    driver: &'a GpiodDriver,
    pin_index: usize,
    active_level: GpioActiveLevel,
}

impl Debug for GpiodPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for GpiodPin<'_> {
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        let line = self.driver.request_output(self.pin_index, self.active_level)?;
        let output = GpiodOutput { pin: self, line };
        Ok(Box::new(output))
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }
}

impl Drop for GpiodPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.release(self.pin_index);
    }
}

struct GpiodOutput<'a> {
    pin: &'a GpiodPin<'a>,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.pin.driver, self.pin.pin_index)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}
