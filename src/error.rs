//! Our error types for the FEB driver.

use thiserror::Error;

use crate::{
    frame::FrameError,
    register::{InvalidChannel, InvalidGain, InvalidGainCode, Setting},
};

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for FEB communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),
    #[error("Invalid output gain: {0}")]
    InvalidGain(f64),
    #[error("Invalid output gain code: {0:#x}")]
    InvalidGainCode(u8),
    #[error("Invalid subrack: {0}")]
    InvalidSubrack(u8),
    #[error("{value} is outside the range of {setting:?}")]
    OutOfRange { setting: Setting, value: f64 },
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Buffer overflow")]
    BufferError,
}

impl<I: embedded_io::Error> From<InvalidChannel> for Error<I> {
    fn from(err: InvalidChannel) -> Self {
        Error::InvalidChannel(err.0)
    }
}

impl<I: embedded_io::Error> From<InvalidGain> for Error<I> {
    fn from(err: InvalidGain) -> Self {
        Error::InvalidGain(err.0)
    }
}

impl<I: embedded_io::Error> From<InvalidGainCode> for Error<I> {
    fn from(err: InvalidGainCode) -> Self {
        Error::InvalidGainCode(err.0)
    }
}

impl<I: embedded_io::Error> From<FrameError> for Error<I> {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidSubrack(subrack) => Error::InvalidSubrack(subrack),
            FrameError::Overflow => Error::BufferError,
            FrameError::InvalidResponse => Error::InvalidResponse,
        }
    }
}
