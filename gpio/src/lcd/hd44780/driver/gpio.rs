use crate::clock::Clock;
use crate::lcd::hd44780::driver::{DriverConfig, HD44780Driver, Instruction, TimingMode};
use crate::{GpioError, GpioOutput, GpioResult};
use log::{debug, trace, warn};
use std::fmt::{Debug, Formatter};

/// The RS, RW and E control lines.
#[derive(Debug)]
pub struct ControlPins<'a> {
    /// Register select: low for instructions, high for character data.
    pub rs: Box<dyn GpioOutput + 'a>,
    /// Read/write: held low, this driver never reads.
    pub rw: Box<dyn GpioOutput + 'a>,
    /// Enable: the controller latches RS and the data lines on its falling edge.
    pub e: Box<dyn GpioOutput + 'a>,
}

impl<'a> ControlPins<'a> {
    pub fn new(
        rs: Box<dyn GpioOutput + 'a>,
        rw: Box<dyn GpioOutput + 'a>,
        e: Box<dyn GpioOutput + 'a>,
    ) -> Self {
        ControlPins { rs, rw, e }
    }
}

/// The eight data lines, D0 (least significant bit) first.
pub struct DataPins<'a>([Box<dyn GpioOutput + 'a>; 8]);

impl<'a> DataPins<'a> {
    pub fn new(pins: [Box<dyn GpioOutput + 'a>; 8]) -> Self {
        DataPins(pins)
    }

    /// Writes every data line, D0 to D7, to the matching bit of `value`.
    pub fn write_byte(&self, value: u8) -> GpioResult<()> {
        for (i, pin) in self.0.iter().enumerate() {
            pin.write(value & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Drives high only the lines whose bit is set in `value`, lowest first. The other lines
    /// are left as they are.
    pub fn raise_bits(&self, value: u8) -> GpioResult<()> {
        for (i, pin) in self.0.iter().enumerate() {
            if value & (1 << i) != 0 {
                pin.set_high()?;
            }
        }
        Ok(())
    }

    fn set_all_low(&self) -> GpioResult<()> {
        for pin in &self.0 {
            pin.set_low()?;
        }
        Ok(())
    }
}

impl<'a> TryFrom<Vec<Box<dyn GpioOutput + 'a>>> for DataPins<'a> {
    type Error = GpioError;

    fn try_from(pins: Vec<Box<dyn GpioOutput + 'a>>) -> Result<Self, Self::Error> {
        let pins: [Box<dyn GpioOutput + 'a>; 8] =
            pins.try_into().map_err(|_| GpioError::InvalidArgument)?;
        Ok(DataPins(pins))
    }
}

impl Debug for DataPins<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// HD44780 driver using an 8-bit parallel bus of GPIO outputs.
///
/// The driver owns all eleven lines and the clock for its whole lifetime. It keeps no display
/// state, and leaves the pins as they are when dropped.
#[derive(Debug)]
pub struct GpioHD44780Driver<'a> {
    control: ControlPins<'a>,
    data: DataPins<'a>,
    clock: Box<dyn Clock + 'a>,
    config: DriverConfig,
}

impl<'a> GpioHD44780Driver<'a> {
    pub fn new(control: ControlPins<'a>, data: DataPins<'a>, clock: Box<dyn Clock + 'a>) -> Self {
        GpioHD44780Driver {
            control,
            data,
            clock,
            config: DriverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn settle(&self) {
        trace!("Settling for {:?}", self.config.settle_duration);
        self.clock.sleep(self.config.settle_duration);
    }

    /// Raises E, writes the byte, lowers E.
    fn pulse_around(&mut self, instruction: Instruction) -> GpioResult<()> {
        self.control.e.set_high()?;
        self.send_byte(instruction.bits())?;
        self.control.e.set_low()
    }

    /// Writes the byte, then holds E high for the settle duration.
    fn pulse_after(&mut self, instruction: Instruction) -> GpioResult<()> {
        self.send_byte(instruction.bits())?;
        self.control.e.set_high()?;
        self.settle();
        self.control.e.set_low()
    }

    /// Framing of the two right-hand shift instructions.
    fn pulse_shift_right(&mut self, instruction: Instruction) -> GpioResult<()> {
        match self.config.timing {
            TimingMode::Faithful => self.pulse_around(instruction),
            TimingMode::Strict => self.pulse_after(instruction),
        }
    }

    fn settle_if_strict(&self) {
        if self.config.timing == TimingMode::Strict {
            self.settle();
        }
    }

    /// Starts from all lines low and latches an instruction by raising only its set bits.
    fn latch_from_zero(&mut self, instruction: Instruction) -> GpioResult<()> {
        self.all_off()?;
        self.control.e.set_high()?;
        self.data.raise_bits(instruction.bits())?;
        self.control.e.set_low()
    }
}

impl HD44780Driver for GpioHD44780Driver<'_> {
    fn all_off(&mut self) -> GpioResult<()> {
        self.control.rs.set_low()?;
        self.control.rw.set_low()?;
        self.control.e.set_low()?;
        self.data.set_all_low()
    }

    fn initialize(&mut self, show_cursor: bool) -> GpioResult<()> {
        debug!("Turning display on, cursor: {}", show_cursor);
        let instruction = if show_cursor {
            Instruction::DisplayOnCursor
        } else {
            Instruction::DisplayOn
        };
        self.latch_from_zero(instruction)
    }

    fn clear(&mut self) -> GpioResult<()> {
        debug!("Clearing display");
        self.latch_from_zero(Instruction::ClearDisplay)?;
        // Clearing takes about 1.52 ms; faithful timing doesn't wait for it.
        self.settle_if_strict();
        Ok(())
    }

    fn home(&mut self) -> GpioResult<()> {
        debug!("Returning cursor home");
        self.pulse_around(Instruction::ReturnHome)?;
        self.settle_if_strict();
        Ok(())
    }

    fn set_text_direction(&mut self, right_to_left: bool) -> GpioResult<()> {
        debug!("Setting text direction, right to left: {}", right_to_left);
        if right_to_left {
            self.pulse_around(Instruction::EntryModeRightToLeft)
        } else {
            self.pulse_around(Instruction::EntryModeLeftToRight)
        }
    }

    fn cursor_left(&mut self) -> GpioResult<()> {
        debug!("Moving cursor left");
        self.pulse_after(Instruction::ShiftCursorLeft)
    }

    fn cursor_right(&mut self) -> GpioResult<()> {
        debug!("Moving cursor right");
        self.pulse_shift_right(Instruction::ShiftCursorRight)
    }

    fn shift_left(&mut self) -> GpioResult<()> {
        debug!("Shifting display left");
        self.pulse_after(Instruction::ShiftDisplayLeft)
    }

    fn shift_right(&mut self) -> GpioResult<()> {
        debug!("Shifting display right");
        self.pulse_shift_right(Instruction::ShiftDisplayRight)
    }

    fn send_byte(&mut self, value: u8) -> GpioResult<()> {
        trace!("Sending data: {:08b}", value);
        self.data.write_byte(value)
    }

    fn send_character_stream(&mut self, strings: &[&str]) -> GpioResult<()> {
        let codes = strings
            .iter()
            .flat_map(|s| s.chars())
            .map(|c| {
                u8::try_from(c).map_err(|_| {
                    warn!("Character {:?} (U+{:04X}) has no single-byte code", c, c as u32);
                    GpioError::InvalidArgument
                })
            })
            .collect::<GpioResult<Vec<u8>>>()?;

        debug!("Writing {} characters", codes.len());

        self.all_off()?;
        self.control.rs.set_high()?;
        for code in codes {
            self.control.e.set_high()?;
            self.send_byte(code)?;
            self.settle();
            self.control.e.set_low()?;
        }
        self.control.rs.set_low()
    }

    fn line_width(&self) -> usize {
        self.config.line_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::driver::CursorDirection;
    use crate::sim::{SimBoard, SimEvent, SimLine};
    use log::{LevelFilter, Log, Metadata, Record};
    use std::cell::RefCell;
    use std::sync::Once;
    use std::time::Duration;

    thread_local! {
        static DEBUG_LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    /// Collects debug-and-above records per test thread.
    struct DebugCollector;

    impl Log for DebugCollector {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::Level::Debug
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                DEBUG_LINES.with(|lines| lines.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static COLLECTOR: DebugCollector = DebugCollector;

    fn debug_lines_of(operation: impl FnOnce()) -> Vec<String> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            log::set_logger(&COLLECTOR).ok();
            log::set_max_level(LevelFilter::Debug);
        });
        DEBUG_LINES.with(|lines| lines.borrow_mut().clear());
        operation();
        DEBUG_LINES.with(|lines| lines.take())
    }

    fn settle() -> SimEvent {
        SimEvent::Sleep(Duration::from_micros(2160))
    }

    fn strict(board: &SimBoard) -> GpioHD44780Driver<'static> {
        board.driver().with_config(DriverConfig {
            timing: TimingMode::Strict,
            ..DriverConfig::default()
        })
    }

    #[test]
    fn send_byte_puts_every_bit_on_its_line() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        for value in 0..=u8::MAX {
            lcd.send_byte(value).unwrap();
            assert_eq!(board.data_byte(), value);
        }
        assert_eq!(board.sleeps(), 0);
        assert!(board.events().iter().all(|event| matches!(event, SimEvent::Write(SimLine::Data(_), _))));
    }

    #[test]
    fn send_byte_writes_d0_first() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.send_byte(0b1000_0001).unwrap();

        let expected: Vec<SimEvent> = (0..8)
            .map(|i| SimEvent::Write(SimLine::Data(i), i == 0 || i == 7))
            .collect();
        assert_eq!(board.events(), expected);
    }

    #[test]
    fn all_off_lowers_every_line() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.initialize(true).unwrap();
        board.output(SimLine::Rs).set_high().unwrap();
        board.output(SimLine::Rw).set_high().unwrap();
        board.output(SimLine::E).set_high().unwrap();
        lcd.send_byte(0xFF).unwrap();

        lcd.all_off().unwrap();
        assert!(SimLine::ALL.iter().all(|&line| !board.level(line)));

        lcd.all_off().unwrap();
        assert!(SimLine::ALL.iter().all(|&line| !board.level(line)));
    }

    #[test]
    fn initialize_without_cursor() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.initialize(false).unwrap();

        assert_eq!(board.data_byte(), 0b0000_1100);
        assert!(!board.level(SimLine::E));
        assert_eq!(board.latched(), vec![(false, 0x0C)]);
        assert_eq!(board.sleeps(), 0);
    }

    #[test]
    fn initialize_with_cursor() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.initialize(true).unwrap();

        assert_eq!(board.data_byte(), 0b0000_1111);
        assert!(!board.level(SimLine::E));
        assert_eq!(board.latched(), vec![(false, 0x0F)]);
    }

    #[test]
    fn initialize_raises_only_the_set_bits_after_all_off() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.initialize(false).unwrap();

        let events = board.events();
        assert_eq!(events.len(), 11 + 4);
        assert_eq!(
            events[11..],
            [
                SimEvent::Write(SimLine::E, true),
                SimEvent::Write(SimLine::Data(2), true),
                SimEvent::Write(SimLine::Data(3), true),
                SimEvent::Write(SimLine::E, false),
            ]
        );
    }

    #[test]
    fn clear_latches_clear_display_without_waiting() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.send_byte(0xFF).unwrap();
        lcd.clear().unwrap();

        assert_eq!(board.data_byte(), 0x01);
        assert_eq!(board.latched(), vec![(false, 0x01)]);
        assert_eq!(board.sleeps(), 0);
    }

    #[test]
    fn home_and_text_direction_pulse_around_the_byte() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.home().unwrap();
        lcd.right_to_left().unwrap();
        lcd.left_to_right().unwrap();

        assert_eq!(board.latched(), vec![(false, 0x02), (false, 0x04), (false, 0x06)]);
        assert_eq!(board.sleeps(), 0);

        let events = board.events();
        assert_eq!(events.first(), Some(&SimEvent::Write(SimLine::E, true)));
        assert_eq!(events[9], SimEvent::Write(SimLine::E, false));
    }

    #[test]
    fn left_shifts_sleep_once_and_right_shifts_never() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.cursor_left().unwrap();
        assert_eq!(board.sleeps(), 1);
        lcd.shift_left().unwrap();
        assert_eq!(board.sleeps(), 2);
        lcd.cursor_right().unwrap();
        assert_eq!(board.sleeps(), 2);
        lcd.shift_right().unwrap();
        assert_eq!(board.sleeps(), 2);

        assert_eq!(
            board.latched(),
            vec![(false, 0x10), (false, 0x18), (false, 0x14), (false, 0x1C)]
        );
    }

    #[test]
    fn cursor_left_puts_the_byte_on_the_bus_before_raising_e() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.cursor_left().unwrap();

        let events = board.events();
        assert!(events[..8].iter().all(|event| matches!(event, SimEvent::Write(SimLine::Data(_), _))));
        assert_eq!(
            events[8..],
            [SimEvent::Write(SimLine::E, true), settle(), SimEvent::Write(SimLine::E, false)]
        );
    }

    #[test]
    fn direction_helpers_dispatch_to_the_shift_operations() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.move_cursor(CursorDirection::Left).unwrap();
        lcd.move_cursor(CursorDirection::Right).unwrap();
        lcd.shift_display(CursorDirection::Left).unwrap();
        lcd.shift_display(CursorDirection::Right).unwrap();

        assert_eq!(
            board.latched(),
            vec![(false, 0x10), (false, 0x14), (false, 0x18), (false, 0x1C)]
        );
    }

    #[test]
    fn strict_timing_waits_after_every_instruction_that_needs_it() {
        let board = SimBoard::new();
        let mut lcd = strict(&board);

        lcd.cursor_right().unwrap();
        lcd.shift_right().unwrap();
        assert_eq!(board.sleeps(), 2);

        lcd.clear().unwrap();
        assert_eq!(board.sleeps(), 3);
        assert_eq!(board.events().last(), Some(&settle()));

        lcd.home().unwrap();
        assert_eq!(board.sleeps(), 4);

        lcd.initialize(false).unwrap();
        lcd.left_to_right().unwrap();
        assert_eq!(board.sleeps(), 4);
    }

    #[test]
    fn strict_timing_puts_right_shifts_on_the_bus_first() {
        let board = SimBoard::new();
        let mut lcd = strict(&board);

        lcd.shift_right().unwrap();

        let events = board.events();
        assert_eq!(
            events[8..],
            [SimEvent::Write(SimLine::E, true), settle(), SimEvent::Write(SimLine::E, false)]
        );
        assert_eq!(board.latched(), vec![(false, 0x1C)]);
    }

    #[test]
    fn character_stream_holds_rs_high_and_settles_per_character() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.send_character_stream(&["ab", "", "c"]).unwrap();

        assert_eq!(board.latched(), vec![(true, b'a'), (true, b'b'), (true, b'c')]);
        assert_eq!(board.sleeps(), 3);
        assert!(!board.level(SimLine::Rs));
        assert_eq!(board.events().last(), Some(&SimEvent::Write(SimLine::Rs, false)));
    }

    #[test]
    fn character_stream_accepts_single_byte_codes_above_ascii() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.send_character_stream(&["\u{00DF}"]).unwrap();

        assert_eq!(board.latched(), vec![(true, 0xDF)]);
    }

    #[test]
    fn character_stream_rejects_wide_characters_before_touching_pins() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        let result = lcd.send_character_stream(&["ok", "\u{20AC}"]);

        assert_eq!(result, Err(GpioError::InvalidArgument));
        assert!(board.events().is_empty());
    }

    #[test]
    fn print_lines_pads_to_twenty_columns() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.print_lines(&["Hi"]).unwrap();

        assert_eq!(board.latched_text(), format!("Hi{}", " ".repeat(18)));
        assert_eq!(board.sleeps(), 20);
    }

    #[test]
    fn print_lines_never_truncates() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        lcd.print_lines_with_width(&["12345678901234567890123"], 20).unwrap();

        assert_eq!(board.latched_text(), "12345678901234567890123");
    }

    #[test]
    fn print_lines_pads_every_line_with_the_configured_width() {
        let board = SimBoard::new();
        let mut lcd = board.driver().with_config(DriverConfig {
            line_width: 4,
            ..DriverConfig::default()
        });

        lcd.print_lines(&["a", "bcdef", ""]).unwrap();

        assert_eq!(board.latched_text(), "a   bcdef    ");
    }

    #[test]
    fn settle_duration_is_configurable() {
        let board = SimBoard::new();
        let mut lcd = board.driver().with_config(DriverConfig {
            settle_duration: Duration::from_micros(50),
            ..DriverConfig::default()
        });

        lcd.cursor_left().unwrap();

        assert!(board.events().contains(&SimEvent::Sleep(Duration::from_micros(50))));
    }

    #[test]
    fn failed_write_aborts_the_sequence() {
        let board = SimBoard::new();
        let mut lcd = board.driver();
        board.fail_writes_to(SimLine::Data(1));

        let result = lcd.initialize(true);

        assert!(matches!(result, Err(GpioError::Other(_))));
        // RS, RW, E, D0 made it; D1 failed and nothing followed.
        assert_eq!(board.events().len(), 4);
        assert_eq!(board.events().last(), Some(&SimEvent::Write(SimLine::Data(0), false)));
    }

    #[test]
    fn failed_write_inside_a_stream_leaves_rs_high() {
        let board = SimBoard::new();
        let mut lcd = board.driver();
        // all_off lowers E once, the first character pulse fails.
        board.fail_writes_after(SimLine::E, 1);

        assert!(lcd.send_character_stream(&["x"]).is_err());
        assert!(board.level(SimLine::Rs));
        assert_eq!(board.sleeps(), 0);
        assert_eq!(board.events().last(), Some(&SimEvent::Write(SimLine::Rs, true)));
    }

    #[test]
    fn data_pins_need_exactly_eight_lines() {
        let board = SimBoard::new();
        let seven: Vec<Box<dyn GpioOutput>> =
            (0..7).map(|i| board.output(SimLine::Data(i))).collect();
        assert!(matches!(DataPins::try_from(seven), Err(GpioError::InvalidArgument)));

        let eight: Vec<Box<dyn GpioOutput>> =
            (0..8).map(|i| board.output(SimLine::Data(i))).collect();
        let pins = DataPins::try_from(eight).unwrap();
        pins.write_byte(0xA5).unwrap();
        assert_eq!(board.data_byte(), 0xA5);
    }

    #[test]
    fn every_high_level_operation_logs_one_debug_line() {
        let board = SimBoard::new();
        let mut lcd = board.driver();

        let operations: [(&str, fn(&mut GpioHD44780Driver<'static>) -> GpioResult<()>); 9] = [
            ("initialize", |lcd| lcd.initialize(true)),
            ("clear", |lcd| lcd.clear()),
            ("home", |lcd| lcd.home()),
            ("set_text_direction", |lcd| lcd.set_text_direction(true)),
            ("cursor_left", |lcd| lcd.cursor_left()),
            ("cursor_right", |lcd| lcd.cursor_right()),
            ("shift_left", |lcd| lcd.shift_left()),
            ("shift_right", |lcd| lcd.shift_right()),
            ("send_character_stream", |lcd| lcd.send_character_stream(&["ab"])),
        ];

        for (name, operation) in operations {
            let lines = debug_lines_of(|| operation(&mut lcd).unwrap());
            assert_eq!(lines.len(), 1, "{name} logged {lines:?}");
        }
    }
}
