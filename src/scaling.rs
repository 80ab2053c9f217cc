//! Quantization between physical values and the FEB's 12-bit DAC codes.
//!
//! Every setting maps its physical range onto the DAC with an affine transform:
//!
//! `code = round(4095 * (offset ± value / scale) / span)`
//!
//! No range checking happens here. Values outside of a setting's domain produce codes outside of
//! `0..=4095`, including negative ones. See [`RangePolicy`](crate::config::RangePolicy) for how
//! the driver treats them.

use crate::register::Setting;

/// Largest code of the 12-bit DAC.
pub const FULL_SCALE_CODE: u16 = 4095;

/// Read-back values carry undefined upper bits, only the low 12 are the DAC code.
pub const CODE_MASK: u16 = 0x0FFF;

/// Range of the TES bias DAC. Some boards were modified for a finer, smaller range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorBiasRange {
    /// ±2000 µA.
    #[default]
    Standard,
    /// ±500 µA.
    Modified,
}

/// Affine map between a physical value and a DAC code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineCode {
    /// Physical offset added before scaling, in units of `value / scale`.
    pub offset: f64,
    /// Width of the range in units of `value / scale`.
    pub span: f64,
    /// Divisor applied to the physical value.
    pub scale: f64,
    /// Whether the code decreases as the physical value increases.
    pub inverted: bool,
}

impl AffineCode {
    pub const fn new(offset: f64, span: f64, scale: f64, inverted: bool) -> Self {
        Self {
            offset,
            span,
            scale,
            inverted,
        }
    }

    /// Convert a physical value into a DAC code, rounding half away from zero.
    ///
    /// The result is not limited to 12 bits.
    pub fn to_code(&self, value: f64) -> i32 {
        let scaled = if self.inverted {
            -value / self.scale
        } else {
            value / self.scale
        };
        round_half_away(FULL_SCALE_CODE as f64 * (self.offset + scaled) / self.span)
    }

    /// Convert a value read back from the board into physical units.
    ///
    /// Only the low 12 bits of `raw` are used.
    pub fn from_code(&self, raw: u16) -> f64 {
        let code = (raw & CODE_MASK) as f64;
        let unscaled = self.span * code / FULL_SCALE_CODE as f64 - self.offset;
        if self.inverted {
            -self.scale * unscaled
        } else {
            self.scale * unscaled
        }
    }

    /// Physical size of one code step.
    pub fn step(&self) -> f64 {
        self.span * self.scale / FULL_SCALE_CODE as f64
    }
}

/// Round to the nearest integer, with ties away from zero.
///
/// Saturates at the limits of `i32`, NaN becomes 0.
fn round_half_away(value: f64) -> i32 {
    // `as` truncates towards zero and saturates.
    let truncated = value as i32;
    let fraction = value - truncated as f64;
    if fraction >= 0.5 {
        truncated.saturating_add(1)
    } else if fraction <= -0.5 {
        truncated.saturating_sub(1)
    } else {
        truncated
    }
}

impl Setting {
    /// Get the transform between physical units and DAC code for this setting.
    pub const fn transfer(self, range: SensorBiasRange) -> AffineCode {
        match self {
            Setting::SensorBias => match range {
                SensorBiasRange::Standard => AffineCode::new(2000.0, 4000.0, 1.0, false),
                SensorBiasRange::Modified => AffineCode::new(500.0, 1000.0, 1.0, false),
            },
            Setting::SquidBias => AffineCode::new(200.0, 400.0, 1.0, false),
            Setting::SquidLock => AffineCode::new(8.0, 16.0, 1.0, true),
            Setting::SquidGain => AffineCode::new(5.0, 10.0, 20.0, true),
            Setting::SquidDriver => AffineCode::new(5.0, 10.0, 1.0, true),
        }
    }

    /// Documented physical range `(min, max)` of this setting.
    ///
    /// For the preamp gain this is narrower than what the DAC can express.
    pub const fn domain(self, range: SensorBiasRange) -> (f64, f64) {
        match self {
            Setting::SensorBias => match range {
                SensorBiasRange::Standard => (-2000.0, 2000.0),
                SensorBiasRange::Modified => (-500.0, 500.0),
            },
            Setting::SquidBias => (-200.0, 200.0),
            Setting::SquidLock => (-8.0, 8.0),
            Setting::SquidGain => (20.0, 100.0),
            Setting::SquidDriver => (-5.0, 5.0),
        }
    }

    /// Physical values corresponding to code `0` and code `4095`.
    pub fn full_scale(self, range: SensorBiasRange) -> (f64, f64) {
        let transfer = self.transfer(range);
        (transfer.from_code(0), transfer.from_code(FULL_SCALE_CODE))
    }

    /// Physical unit of this setting, for display.
    pub const fn unit(self) -> &'static str {
        match self {
            Setting::SensorBias | Setting::SquidBias => "uA",
            Setting::SquidLock => "mV",
            Setting::SquidGain => "",
            Setting::SquidDriver => "V",
        }
    }

    pub fn encode(self, value: f64, range: SensorBiasRange) -> i32 {
        self.transfer(range).to_code(value)
    }

    pub fn decode(self, raw: u16, range: SensorBiasRange) -> f64 {
        self.transfer(range).from_code(raw)
    }
}
