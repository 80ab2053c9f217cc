//! This module is used to define the settings, channels and control/status registers on the FEB.
//!
//! Every register is addressed with a 16-bit word:
//!
//! `address = (slot << 8) | (setting_id << 4) | channel_id`
//!
//! Setting ids 1 - 5 are per-channel DAC values. Setting id 14 is the CSR bank, where the low
//! nibble selects one of three whole-slot registers instead of a channel.

use core::str::FromStr;

use modular_bitfield::prelude::*;
use strum_macros::EnumIter;
use thiserror::Error;

/// The per-channel DAC settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Setting {
    /// __R/W__ - TES (sensor) bias current, µA.
    SensorBias = 1,
    /// __R/W__ - SQUID bias current, µA.
    SquidBias = 2,
    /// __R/W__ - SQUID lock point voltage, mV.
    SquidLock = 3,
    /// __R/W__ - Preamp (SQUID) gain.
    SquidGain = 4,
    /// __R/W__ - Output driver offset, V.
    SquidDriver = 5,
}

impl From<Setting> for u8 {
    fn from(value: Setting) -> Self {
        value as u8
    }
}

/// Setting id of the register bank holding the whole-slot CSRs.
pub const CSR_BANK: u8 = 14;

/// The control/status registers found in the CSR bank of each slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum CsrRegister {
    /// One bit per channel connecting the signal generator to the TES line.
    ///
    /// See [`SenseBiasRegister`].
    SenseBias = 0,
    /// Feedback loop, feedback polarity, signal generator to feedback and signal source bits.
    ///
    /// See [`ControlRegister`].
    Control = 1,
    /// One nibble per channel selecting the output gain.
    ///
    /// See [`DriverGainRegister`].
    DriverGain = 2,
}

/// The four channels of a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum Channel {
    A = 10,
    B = 11,
    C = 12,
    D = 13,
}

impl Channel {
    /// Position of this channel within a slot, `A` => 0 to `D` => 3.
    ///
    /// Used as the bit (or nibble) index into the CSRs.
    pub const fn index(self) -> u8 {
        self as u8 - Channel::A as u8
    }
}

impl From<Channel> for u8 {
    fn from(value: Channel) -> Self {
        value as u8
    }
}

/// A channel id outside of `A` - `D` (10 - 13).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid channel id {0}")]
pub struct InvalidChannel(pub u8);

impl TryFrom<u8> for Channel {
    type Error = InvalidChannel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Channel::A),
            11 => Ok(Channel::B),
            12 => Ok(Channel::C),
            13 => Ok(Channel::D),
            _ => Err(InvalidChannel(value)),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Channel name not recognised")]
pub struct ParseChannelError;

impl FromStr for Channel {
    type Err = ParseChannelError;

    /// Accepts the channel letter (either case) or the numeric channel id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Channel::A),
            "B" | "b" => Ok(Channel::B),
            "C" | "c" => Ok(Channel::C),
            "D" | "d" => Ok(Channel::D),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(|id| Channel::try_from(id).ok())
                .ok_or(ParseChannelError),
        }
    }
}

/// Address of a per-channel DAC setting.
pub const fn setting_address(slot: u8, setting: Setting, channel: Channel) -> u16 {
    ((slot as u16) << 8) | ((setting as u16) << 4) | channel as u16
}

/// Address of a whole-slot CSR.
pub const fn csr_address(slot: u8, register: CsrRegister) -> u16 {
    ((slot as u16) << 8) | ((CSR_BANK as u16) << 4) | register as u16
}

/// Identifies one channel of one board.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Subrack (crate) number, 0 - 7.
    pub subrack: u8,
    /// Board slot within the subrack.
    pub slot: u8,
    pub channel: Channel,
}

impl Target {
    pub const fn new(subrack: u8, slot: u8, channel: Channel) -> Self {
        Self {
            subrack,
            slot,
            channel,
        }
    }

    /// Build a target from a numeric channel id (10 - 13).
    pub fn from_raw(subrack: u8, slot: u8, channel_id: u8) -> Result<Self, InvalidChannel> {
        Ok(Self::new(subrack, slot, Channel::try_from(channel_id)?))
    }

    /// Address of `setting` for this channel.
    pub const fn setting_address(&self, setting: Setting) -> u16 {
        setting_address(self.slot, setting, self.channel)
    }

    /// Address of a CSR on this channel's board.
    pub const fn csr_address(&self, register: CsrRegister) -> u16 {
        csr_address(self.slot, register)
    }
}

/// The single-bit controls available per channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
pub enum Control {
    /// SQUID feedback loop closed.
    FeedbackLoopClosed,
    /// Feedback polarity inverted.
    FeedbackPolarityInverted,
    /// Signal generator connected to the feedback line.
    SignalGeneratorFeedback,
    /// Signal source is the preamp rather than the feedback.
    SourcePreamp,
    /// Signal generator connected to the TES line.
    SignalGeneratorTes,
}

impl Control {
    /// Register holding this control.
    pub const fn register(self) -> CsrRegister {
        match self {
            Control::SignalGeneratorTes => CsrRegister::SenseBias,
            _ => CsrRegister::Control,
        }
    }

    /// Bit offset of channel `A`, the other channels follow on the next bits.
    const fn base_offset(self) -> u8 {
        match self {
            Control::FeedbackLoopClosed => 0,
            Control::FeedbackPolarityInverted => 4,
            Control::SignalGeneratorFeedback => 8,
            Control::SourcePreamp => 12,
            Control::SignalGeneratorTes => 0,
        }
    }

    /// Whether the board stores the negation of the logical value.
    ///
    /// Only the signal generator to feedback switch is stored as is.
    pub const fn inverted(self) -> bool {
        !matches!(self, Control::SignalGeneratorFeedback)
    }

    pub const fn bit_offset(self, channel: Channel) -> u8 {
        self.base_offset() + channel.index()
    }

    /// Read the logical value of this control for `channel` out of a register word.
    pub const fn extract(self, register: u16, channel: Channel) -> bool {
        let bit = register & (1 << self.bit_offset(channel)) != 0;
        bit != self.inverted()
    }

    /// Return `register` with only this control's bit for `channel` replaced.
    pub const fn apply(self, register: u16, channel: Channel, value: bool) -> u16 {
        let offset = self.bit_offset(channel);
        let bit = (value != self.inverted()) as u16;
        (register & !(1 << offset)) | (bit << offset)
    }
}

/// An output gain value was not one of the sixteen supported gains.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Invalid output gain {0}")]
pub struct InvalidGain(pub f64);

/// A driver gain nibble did not decode to a gain.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid output gain code {0:#x}")]
pub struct InvalidGainCode(pub u8);

/// The output (driver) gains, one nibble per channel in the driver gain register.
///
/// Negative gains invert the output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum OutputGain {
    /// Unity gain, this is the power-on state.
    X1 = 0,
    X1_43 = 1,
    X2 = 2,
    X5 = 3,
    X10 = 4,
    X14_3 = 5,
    X20 = 6,
    X50 = 7,
    Neg1 = 8,
    Neg1_43 = 9,
    Neg2 = 10,
    Neg5 = 11,
    Neg10 = 12,
    Neg14_3 = 13,
    Neg20 = 14,
    Neg50 = 15,
}

impl OutputGain {
    /// Magnitudes in nibble order, the upper half repeats them negated.
    const MAGNITUDES: [f64; 8] = [1.0, 1.43, 2.0, 5.0, 10.0, 14.3, 20.0, 50.0];

    pub const fn nibble(self) -> u8 {
        self as u8
    }

    pub fn value(self) -> f64 {
        let magnitude = Self::MAGNITUDES[(self as u8 & 0x7) as usize];
        if self as u8 & 0x8 != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    pub fn from_nibble(nibble: u8) -> Result<Self, InvalidGainCode> {
        use OutputGain as OG;
        match nibble {
            0 => Ok(OG::X1),
            1 => Ok(OG::X1_43),
            2 => Ok(OG::X2),
            3 => Ok(OG::X5),
            4 => Ok(OG::X10),
            5 => Ok(OG::X14_3),
            6 => Ok(OG::X20),
            7 => Ok(OG::X50),
            8 => Ok(OG::Neg1),
            9 => Ok(OG::Neg1_43),
            10 => Ok(OG::Neg2),
            11 => Ok(OG::Neg5),
            12 => Ok(OG::Neg10),
            13 => Ok(OG::Neg14_3),
            14 => Ok(OG::Neg20),
            15 => Ok(OG::Neg50),
            _ => Err(InvalidGainCode(nibble)),
        }
    }

    /// Return `register` with only `channel`'s nibble replaced by this gain.
    pub const fn apply(self, register: u16, channel: Channel) -> u16 {
        let shift = channel.index() * 4;
        (register & !(0xF << shift)) | ((self as u16) << shift)
    }

    /// Decode `channel`'s nibble of a driver gain register word.
    pub fn extract(register: u16, channel: Channel) -> Result<Self, InvalidGainCode> {
        let nibble = (register >> (channel.index() * 4)) & 0xF;
        Self::from_nibble(nibble as u8)
    }
}

impl TryFrom<f64> for OutputGain {
    type Error = InvalidGain;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let magnitude = if value < 0.0 { -value } else { value };
        let index = Self::MAGNITUDES
            .iter()
            .position(|gain| *gain == magnitude)
            .ok_or(InvalidGain(value))?;
        let nibble = if value < 0.0 { index + 8 } else { index };
        Self::from_nibble(nibble as u8).map_err(|_| InvalidGain(value))
    }
}

impl From<OutputGain> for f64 {
    fn from(value: OutputGain) -> Self {
        value.value()
    }
}

/// Snapshot of the control register ([`CsrRegister::Control`]).
///
/// Fields hold the raw bits, so the inverted controls read as their negation, e.g.
/// `loop_open_a` is set when the feedback loop of channel `A` is open.
#[bitfield]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegister {
    pub loop_open_a: bool,
    pub loop_open_b: bool,
    pub loop_open_c: bool,
    pub loop_open_d: bool,
    pub polarity_normal_a: bool,
    pub polarity_normal_b: bool,
    pub polarity_normal_c: bool,
    pub polarity_normal_d: bool,
    pub sg_feedback_a: bool,
    pub sg_feedback_b: bool,
    pub sg_feedback_c: bool,
    pub sg_feedback_d: bool,
    pub source_feedback_a: bool,
    pub source_feedback_b: bool,
    pub source_feedback_c: bool,
    pub source_feedback_d: bool,
}

/// Snapshot of the driver gain register ([`CsrRegister::DriverGain`]).
#[bitfield]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverGainRegister {
    pub gain_a: B4,
    pub gain_b: B4,
    pub gain_c: B4,
    pub gain_d: B4,
}

impl DriverGainRegister {
    /// Decoded output gain of `channel`.
    pub fn gain(&self, channel: Channel) -> Result<OutputGain, InvalidGainCode> {
        let nibble = match channel {
            Channel::A => self.gain_a(),
            Channel::B => self.gain_b(),
            Channel::C => self.gain_c(),
            Channel::D => self.gain_d(),
        };
        OutputGain::from_nibble(nibble)
    }
}

/// Snapshot of the sense-bias register ([`CsrRegister::SenseBias`]).
///
/// A set `sg_tes_open_*` bit means the signal generator is disconnected from that TES line.
#[bitfield]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseBiasRegister {
    pub sg_tes_open_a: bool,
    pub sg_tes_open_b: bool,
    pub sg_tes_open_c: bool,
    pub sg_tes_open_d: bool,
    pub reserved: B12,
}
