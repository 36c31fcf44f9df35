//! HD44780 LCD module.
//!
//! Drives an HD44780-compatible character display over its 8-bit parallel interface: eight data
//! lines plus the RS, RW and E control lines. The driver only ever writes; RW is held low and
//! the busy flag is never polled, so every instruction is followed by a fixed settle delay where
//! the timing requires one.

pub mod driver;
