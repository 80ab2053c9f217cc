//! ASCII command frames of the FEB bus.
//!
//! Address-select and data frames share one layout:
//!
//! `HEADER + field + "0" + subrack + FOOTER`, e.g. `c4d03e1` `0b` `00zx` without the gaps selects
//! the control register of slot 3 on subrack 3.
//!
//! `field` is the register address (always 4 hex digits) or the data word. Bit 3 of the subrack
//! nibble is set on address-select frames and clear on data frames. A read is an address-select
//! frame followed by [`READ_COMMAND`], to which the board answers with one line whose first 4
//! characters are the register value in hex.

use core::fmt::Write;

use thiserror::Error;

use crate::config::FieldPadding;

pub const HEADER: &str = "c4d";
pub const FOOTER: &str = "00zx";
pub const READ_COMMAND: &str = "c2x";

/// Subrack bit marking a frame as address-select.
pub const ADDRESS_SELECT_BIT: u8 = 0x8;

/// Largest subrack number, the next bit is [`ADDRESS_SELECT_BIT`].
pub const MAX_SUBRACK: u8 = 0x7;

/// Number of significant characters at the start of a response.
pub const RESPONSE_FIELD_LEN: usize = 4;

/// Longest frame is `c4d` + 4 digits + `0` + 1 digit + `00zx`.
pub type Frame = heapless::String<16>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Subrack {0} does not fit the frame")]
    InvalidSubrack(u8),
    #[error("Frame buffer overflow")]
    Overflow,
    #[error("Response is not a hex register value")]
    InvalidResponse,
}

fn build(field: u16, padding: FieldPadding, subrack_nibble: u8) -> Result<Frame, FrameError> {
    let mut frame = Frame::new();
    let written = match padding {
        FieldPadding::FourDigits => write!(
            frame,
            "{HEADER}{field:04x}0{subrack_nibble:x}{FOOTER}"
        ),
        FieldPadding::Natural => write!(frame, "{HEADER}{field:x}0{subrack_nibble:x}{FOOTER}"),
    };
    written.map_err(|_| FrameError::Overflow)?;
    Ok(frame)
}

fn check_subrack(subrack: u8) -> Result<(), FrameError> {
    if subrack > MAX_SUBRACK {
        return Err(FrameError::InvalidSubrack(subrack));
    }
    Ok(())
}

/// Build the frame selecting `address` on `subrack`.
pub fn address_frame(subrack: u8, address: u16) -> Result<Frame, FrameError> {
    check_subrack(subrack)?;
    build(address, FieldPadding::FourDigits, subrack | ADDRESS_SELECT_BIT)
}

/// Build the frame carrying `data` to the previously selected address of `subrack`.
pub fn data_frame(subrack: u8, data: u16, padding: FieldPadding) -> Result<Frame, FrameError> {
    check_subrack(subrack)?;
    build(data, padding, subrack)
}

/// Extract the register value from a response line.
///
/// Only the first 4 characters are significant, whatever follows is discarded unchecked.
pub fn parse_response(response: &str) -> Result<u16, FrameError> {
    let response = response.trim_start();
    let field = response
        .char_indices()
        .nth(RESPONSE_FIELD_LEN)
        .map_or(response, |(end, _)| &response[..end]);
    if field.is_empty() {
        return Err(FrameError::InvalidResponse);
    }
    u16::from_str_radix(field, 16).map_err(|_| FrameError::InvalidResponse)
}
