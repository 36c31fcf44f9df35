pub mod clock;
pub mod gpiod;
pub mod lcd;
pub mod sim;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO lines available.
    fn count(&self) -> GpioResult<usize>;

    /// Gets the GPIO pin at the given index.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin has been handed out and not dropped yet.
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>>;
}

/// Specifies the active level of the GPIO pin.
///
/// By default, the active level is high.
///
/// With [GpioActiveLevel::Low], writing `true` drives the line low. Useful when the display is
/// behind an inverting level shifter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioActiveLevel {
    #[default] High,
    Low,
}

pub trait GpioPin: Debug {
    /// Sets the GPIO pin function to output, allowing writing its state.
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>>;

    /// Gets the active level of the GPIO pin.
    fn active_level(&self) -> GpioActiveLevel {
        GpioActiveLevel::High
    }
    /// Sets the active level of the GPIO pin.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the pin does not support active level.
    fn set_active_level(&mut self, _level: GpioActiveLevel) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }
}

/// A single digital output line.
///
/// This is the only capability the LCD drivers need from a backend. Implementations report
/// failures (line not present, line claimed elsewhere, rejected by the platform) through
/// [GpioError] and never retry on their own.
pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;

    /// Drives the pin to its active (high) level.
    fn set_high(&self) -> GpioResult<()> {
        self.write(true)
    }

    /// Drives the pin to its inactive (low) level.
    fn set_low(&self) -> GpioResult<()> {
        self.write(false)
    }
}
