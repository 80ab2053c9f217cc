//! This crate provides an interface for configuring the CDMS-style phonon Front-End Board (FEB)
//! used to read out transition-edge-sensor (TES) detectors.
//!
//! It supports `no-std` environments by use of the `no-std` feature flag.
//!
//! The FEB is driven over a line-oriented ASCII instrument bus. Every register access is a pair
//! of commands: an address-select frame followed either by a data frame (write) or by the read
//! request `c2x` (read). Each channel of a slot has five 12-bit DAC settings:
//! * TES (sensor) bias, ±2000 µA.
//! * SQUID bias, ±200 µA.
//! * SQUID lock point, ±8 mV.
//! * Preamp gain, 20 - 100.
//! * Output (driver) offset, ±5 V.
//!
//! The remaining controls live in three whole-slot control/status registers which the board can
//! only read and write as full 16-bit words, so this crate always re-reads a register before
//! changing the bits belonging to one channel.
//!
//! The bus needs a settle time after every command, 160 ms by default. Reading all settings of a
//! channel therefore takes a couple of seconds.

#![cfg_attr(feature = "no-std", no_std)]

pub mod config;
#[cfg(not(feature = "no-std"))]
pub mod delay;
pub mod error;
pub mod feb;
pub mod frame;
pub mod register;
pub mod scaling;

#[cfg(test)]
mod mock_serial;
