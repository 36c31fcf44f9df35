mod config;

use std::env::var;
use dotenv::dotenv;
use log::{debug, info};
use parlcd_gpio::{GpioActiveLevel, GpioDriver, GpioPin, GpioResult};
use parlcd_gpio::clock::ThreadClock;
use parlcd_gpio::gpiod::GpiodDriver;
use parlcd_gpio::lcd::hd44780::driver::{ControlPins, DataPins, GpioHD44780Driver, HD44780Driver};
use sysinfo::System;
use crate::config::Config;

fn parse_pin_bus<const N: usize>(pin_str: &str) -> eyre::Result<[usize; N]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre::eyre!("Invalid number of data pins, expected {}", N))
}

/// Sets the active level of a pin, leaving pins already at that level alone so backends without
/// active level support still work when nothing needs to change.
fn apply_active_level<P: GpioPin + ?Sized>(pin: &mut P, level: GpioActiveLevel) -> GpioResult<()> {
    if pin.active_level() == level {
        return Ok(());
    }
    pin.set_active_level(level)
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "parlcd starting on {} ({})",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    // Get pin numbers from env
    let chip_path = var("PARLCD_GPIO_CHIP").unwrap_or_else(|_| "/dev/gpiochip0".to_string());
    let lcd_rs_pin_no: usize = var("PARLCD_PIN_RS")?.parse()?;
    let lcd_rw_pin_no: usize = var("PARLCD_PIN_RW")?.parse()?;
    let lcd_e_pin_no: usize = var("PARLCD_PIN_E")?.parse()?;
    let lcd_data_pin_nos: [usize; 8] = parse_pin_bus(&var("PARLCD_PINS_DATA")?)?;

    info!("LCD @ {} RS: {}, RW: {}, E: {}, Data: {:?}",
        chip_path, lcd_rs_pin_no, lcd_rw_pin_no, lcd_e_pin_no, lcd_data_pin_nos);

    let config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    debug!("{:?}", config);

    debug!("Initializing GPIO driver...");
    let gpio = GpiodDriver::open(&chip_path)?;
    debug!("{:?} initialized.", gpio);

    debug!("Initializing LCD driver...");
    let mut lcd_rs_pin = gpio.get_pin(lcd_rs_pin_no)?;
    let mut lcd_rw_pin = gpio.get_pin(lcd_rw_pin_no)?;
    let mut lcd_e_pin = gpio.get_pin(lcd_e_pin_no)?;
    let mut lcd_data_pins = lcd_data_pin_nos
        .iter()
        .map(|&no| gpio.get_pin(no))
        .collect::<GpioResult<Vec<_>>>()?;

    let active_level = config.active_level();
    debug!("LCD lines active {:?}", active_level);
    apply_active_level(&mut *lcd_rs_pin, active_level)?;
    apply_active_level(&mut *lcd_rw_pin, active_level)?;
    apply_active_level(&mut *lcd_e_pin, active_level)?;
    for pin in lcd_data_pins.iter_mut() {
        apply_active_level(&mut **pin, active_level)?;
    }

    let control = ControlPins::new(
        lcd_rs_pin.as_output()?,
        lcd_rw_pin.as_output()?,
        lcd_e_pin.as_output()?,
    );
    let data = DataPins::try_from(
        lcd_data_pins
            .iter_mut()
            .map(|pin| pin.as_output())
            .collect::<GpioResult<Vec<_>>>()?,
    )?;

    let mut lcd = GpioHD44780Driver::new(control, data, Box::new(ThreadClock))
        .with_config(config.driver_config());
    debug!("{:?} initialized.", lcd);

    lcd.initialize(config.show_cursor)?;
    lcd.clear()?;

    let lines: Vec<&str> = config.lines.iter().map(String::as_str).collect();
    lcd.print_lines(&lines)?;

    info!("Printed {} line(s).", lines.len());

    Ok(())
}
