//! Driver configuration.

use fugit::MillisDurationU32;

use crate::scaling::SensorBiasRange;

/// Settle time the FEB needs after each command.
pub const DEFAULT_SETTLE_DELAY: MillisDurationU32 = MillisDurationU32::millis(160);

/// How setting values outside of a setting's documented domain are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Quantize the value as is and send the resulting code, wrapped to the 16-bit data field.
    #[default]
    Permissive,
    /// Limit the value to the documented domain and log a warning.
    Clamp,
    /// Reject the value with [`Error::OutOfRange`](crate::error::Error::OutOfRange) before any
    /// bus traffic.
    Strict,
}

/// How the data field of a write frame is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPadding {
    /// Zero-padded to 4 hex digits, like the address field.
    #[default]
    FourDigits,
    /// As many hex digits as the value needs. Older host software sent data this way.
    Natural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FebConfig {
    /// Delay after every register write and every register read.
    pub settle_delay: MillisDurationU32,
    pub range_policy: RangePolicy,
    pub sensor_bias_range: SensorBiasRange,
    pub data_padding: FieldPadding,
    /// Appended to every frame sent and expected at the end of every response.
    pub line_terminator: &'static str,
}

impl Default for FebConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            range_policy: RangePolicy::default(),
            sensor_bias_range: SensorBiasRange::default(),
            data_padding: FieldPadding::default(),
            line_terminator: "\n",
        }
    }
}

impl FebConfig {
    pub fn with_settle_delay(mut self, settle_delay: MillisDurationU32) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_range_policy(mut self, range_policy: RangePolicy) -> Self {
        self.range_policy = range_policy;
        self
    }

    pub fn with_sensor_bias_range(mut self, sensor_bias_range: SensorBiasRange) -> Self {
        self.sensor_bias_range = sensor_bias_range;
        self
    }

    pub fn with_data_padding(mut self, data_padding: FieldPadding) -> Self {
        self.data_padding = data_padding;
        self
    }

    /// Set the line terminator. An empty terminator is ignored.
    pub fn with_line_terminator(mut self, line_terminator: &'static str) -> Self {
        if !line_terminator.is_empty() {
            self.line_terminator = line_terminator;
        }
        self
    }
}
