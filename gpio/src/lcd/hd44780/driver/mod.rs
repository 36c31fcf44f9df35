//! HD44780 driver interface.
//!
//! See [HD44780Driver] for the operation set, and [GpioHD44780Driver] for the implementation
//! driving the controller directly through GPIO outputs.

mod gpio;

use crate::GpioResult;
use std::fmt::Debug;
use std::time::Duration;
pub use gpio::*;

/// Worst-case execution time of an HD44780 instruction.
pub const DEFAULT_SETTLE_DURATION: Duration = Duration::from_micros(2160);

/// Width of the common 20-column modules.
pub const DEFAULT_LINE_WIDTH: usize = 20;

/// Instruction codes sent with RS low.
///
/// Only the instructions this driver issues are listed. Bit layout per the HD44780 datasheet:
/// - `00000001` clear display
/// - `0000001?` return home
/// - `000001IS` entry mode set, `I` = increment (left-to-right), `S` = shift display
/// - `00001DCB` display control, `D` = display on, `C` = cursor on, `B` = blink
/// - `0001DR??` cursor/display shift, `D` = shift display, `R` = right
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    ClearDisplay = 0b0000_0001,
    ReturnHome = 0b0000_0010,
    EntryModeRightToLeft = 0b0000_0100,
    EntryModeLeftToRight = 0b0000_0110,
    /// Display on, cursor and blink off.
    DisplayOn = 0b0000_1100,
    /// Display on, cursor on, blinking.
    DisplayOnCursor = 0b0000_1111,
    ShiftCursorLeft = 0b0001_0000,
    ShiftCursorRight = 0b0001_0100,
    ShiftDisplayLeft = 0b0001_1000,
    ShiftDisplayRight = 0b0001_1100,
}

impl Instruction {
    /// Gets the byte put on the data bus for this instruction.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor (or the display) to the left.
    Left,
    /// Moves the cursor (or the display) to the right.
    Right,
}

/// Selects how instructions are framed in time.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TimingMode {
    /// Reproduces the established pulse framing exactly:
    /// - cursor left and display shift left put the byte on the bus first, then hold E high for
    ///   the settle duration;
    /// - cursor right and display shift right pulse E around the write with no delay;
    /// - clear and home return as soon as E falls.
    #[default]
    Faithful,
    /// All four shift instructions use the delayed framing, and clear and home wait for the
    /// settle duration after E falls.
    Strict,
}

/// Settings of a [GpioHD44780Driver].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DriverConfig {
    /// Delay applied after character writes and the delayed instructions.
    pub settle_duration: Duration,
    /// Width [HD44780Driver::print_lines] pads to.
    pub line_width: usize,
    pub timing: TimingMode,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            settle_duration: DEFAULT_SETTLE_DURATION,
            line_width: DEFAULT_LINE_WIDTH,
            timing: TimingMode::Faithful,
        }
    }
}

/// The `HD44780Driver` trait defines the write-only operation set of an HD44780 controller.
///
/// Every method runs its whole pin sequence, including any delay, before returning. A failed
/// pin write aborts the sequence and is returned as is; the display may then be left half
/// updated, as the controller state is never read back.
pub trait HD44780Driver: Debug {
    /// Drives RS, RW, E and all data lines low.
    fn all_off(&mut self) -> GpioResult<()>;

    /// Turns the display on, with a blinking cursor if `show_cursor` is set.
    fn initialize(&mut self, show_cursor: bool) -> GpioResult<()>;

    /// Clears the display and returns the cursor home.
    fn clear(&mut self) -> GpioResult<()>;

    /// Moves the cursor to the first character of the first line without clearing the display.
    fn home(&mut self) -> GpioResult<()>;

    /// Sets the entry mode: text grows to the left if `right_to_left`, to the right otherwise.
    fn set_text_direction(&mut self, right_to_left: bool) -> GpioResult<()>;

    fn cursor_left(&mut self) -> GpioResult<()>;

    fn cursor_right(&mut self) -> GpioResult<()>;

    /// Shifts the whole display one position to the left.
    fn shift_left(&mut self) -> GpioResult<()>;

    /// Shifts the whole display one position to the right.
    fn shift_right(&mut self) -> GpioResult<()>;

    /// Puts `value` on the data lines, bit 0 on D0. Touches no control line and doesn't wait.
    fn send_byte(&mut self, value: u8) -> GpioResult<()>;

    /// Writes every character of every string to the display, in order, with RS held high.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if any character is above U+00FF. The check runs before
    ///   any pin is touched.
    fn send_character_stream(&mut self, strings: &[&str]) -> GpioResult<()>;

    /// Gets the width [HD44780Driver::print_lines] pads to.
    fn line_width(&self) -> usize;

    fn right_to_left(&mut self) -> GpioResult<()> {
        self.set_text_direction(true)
    }

    fn left_to_right(&mut self) -> GpioResult<()> {
        self.set_text_direction(false)
    }

    /// Moves the cursor one position in the given direction.
    fn move_cursor(&mut self, direction: CursorDirection) -> GpioResult<()> {
        match direction {
            CursorDirection::Left => self.cursor_left(),
            CursorDirection::Right => self.cursor_right(),
        }
    }

    /// Shifts the display one position in the given direction.
    fn shift_display(&mut self, direction: CursorDirection) -> GpioResult<()> {
        match direction {
            CursorDirection::Left => self.shift_left(),
            CursorDirection::Right => self.shift_right(),
        }
    }

    /// Pads every line to [HD44780Driver::line_width] and sends them as one character stream.
    fn print_lines(&mut self, lines: &[&str]) -> GpioResult<()> {
        let width = self.line_width();
        self.print_lines_with_width(lines, width)
    }

    /// Right-pads every line with spaces to `width` characters and sends them as one character
    /// stream. Longer lines are sent whole, never truncated.
    fn print_lines_with_width(&mut self, lines: &[&str], width: usize) -> GpioResult<()> {
        let padded: Vec<String> = lines.iter().map(|line| format!("{line:<width$}")).collect();
        let padded: Vec<&str> = padded.iter().map(String::as_str).collect();
        self.send_character_stream(&padded)
    }
}
