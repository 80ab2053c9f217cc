use embedded_hal::delay::DelayNs;
use embedded_io::Error as _;
use fugit::MillisDurationU32;
use log::{debug, trace, warn};

use crate::{
    config::{FebConfig, RangePolicy},
    error::{Error, Result},
    frame::{self, READ_COMMAND},
    register::{
        Control, ControlRegister, CsrRegister, DriverGainRegister, OutputGain, SenseBiasRegister,
        Setting, Target, csr_address,
    },
    scaling::FULL_SCALE_CODE,
};

/// You can create a FebDriver using any interface which implements [embedded_io::Read] &
/// [embedded_io::Write], plus a [DelayNs] provider for the settle delays.
///
/// For its methods, we generally use the nomenclature that "set" means to write a configuration
/// and "get" (or "is") means to read back a configuration value.
///
/// The driver keeps no copy of the board state. Every partial update of a control/status
/// register reads the register first, so another host changing the board in between is picked up.
/// It does assume exclusive use of the bus for the duration of each call.
pub struct FebDriver<S: embedded_io::Read + embedded_io::Write, D: DelayNs, const L: usize = 64> {
    interface: S,
    delay: D,
    config: FebConfig,
}

/// Every setting and control of one channel, as read by [FebDriver::read_channel_settings].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSettings {
    pub tes_bias_ua: f64,
    pub squid_bias_ua: f64,
    pub lock_point_mv: f64,
    pub preamp_gain: f64,
    pub output_offset_v: f64,
    pub output_gain: OutputGain,
    pub feedback_loop_closed: bool,
    pub feedback_polarity_inverted: bool,
    pub signal_generator_feedback: bool,
    pub source_preamp: bool,
    pub signal_generator_tes: bool,
}

impl<S: embedded_io::Read + embedded_io::Write, D: DelayNs, const L: usize> FebDriver<S, D, L> {
    /// Create a new FebDriver with the default configuration.
    pub fn new(interface: S, delay: D) -> Self {
        Self::with_config(interface, delay, FebConfig::default())
    }

    pub fn with_config(interface: S, delay: D, config: FebConfig) -> Self {
        Self {
            interface,
            delay,
            config,
        }
    }

    pub fn config(&self) -> &FebConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FebConfig) {
        self.config = config;
    }

    /// Give back the interface and delay provider.
    pub fn release(self) -> (S, D) {
        (self.interface, self.delay)
    }

    /// Set the TES bias current in µA. Range is ±2000 µA (±500 µA on modified boards).
    pub fn set_tes_bias_ua(&mut self, target: Target, bias_ua: f64) -> Result<(), S::Error> {
        self.set_setting(target, Setting::SensorBias, bias_ua)
    }

    /// Get the TES bias current in µA.
    pub fn get_tes_bias_ua(&mut self, target: Target) -> Result<f64, S::Error> {
        self.get_setting(target, Setting::SensorBias)
    }

    /// Set the SQUID bias current in µA. Range is ±200 µA.
    pub fn set_squid_bias_ua(&mut self, target: Target, bias_ua: f64) -> Result<(), S::Error> {
        self.set_setting(target, Setting::SquidBias, bias_ua)
    }

    /// Get the SQUID bias current in µA.
    pub fn get_squid_bias_ua(&mut self, target: Target) -> Result<f64, S::Error> {
        self.get_setting(target, Setting::SquidBias)
    }

    /// Set the SQUID lock point in mV. Range is ±8 mV.
    pub fn set_lock_point_mv(
        &mut self,
        target: Target,
        lock_point_mv: f64,
    ) -> Result<(), S::Error> {
        self.set_setting(target, Setting::SquidLock, lock_point_mv)
    }

    /// Get the SQUID lock point in mV.
    pub fn get_lock_point_mv(&mut self, target: Target) -> Result<f64, S::Error> {
        self.get_setting(target, Setting::SquidLock)
    }

    /// Set the preamp gain. Range is 20 - 100.
    pub fn set_preamp_gain(&mut self, target: Target, gain: f64) -> Result<(), S::Error> {
        self.set_setting(target, Setting::SquidGain, gain)
    }

    /// Get the preamp gain.
    pub fn get_preamp_gain(&mut self, target: Target) -> Result<f64, S::Error> {
        self.get_setting(target, Setting::SquidGain)
    }

    /// Set the output (driver) offset in V. Range is ±5 V.
    pub fn set_output_offset_v(&mut self, target: Target, offset_v: f64) -> Result<(), S::Error> {
        self.set_setting(target, Setting::SquidDriver, offset_v)
    }

    /// Get the output (driver) offset in V.
    pub fn get_output_offset_v(&mut self, target: Target) -> Result<f64, S::Error> {
        self.get_setting(target, Setting::SquidDriver)
    }

    /// Quantize `value` and write it to `setting` of the target channel.
    ///
    /// Values outside of the setting's domain are handled according to the configured
    /// [RangePolicy].
    pub fn set_setting(
        &mut self,
        target: Target,
        setting: Setting,
        value: f64,
    ) -> Result<(), S::Error> {
        self.set_setting_with_settle(target, setting, value, self.config.settle_delay)
    }

    /// Same as [Self::set_setting] with a one-off settle delay.
    pub fn set_setting_with_settle(
        &mut self,
        target: Target,
        setting: Setting,
        value: f64,
        settle: MillisDurationU32,
    ) -> Result<(), S::Error> {
        let value = self.check_range(setting, value)?;
        let code = setting.encode(value, self.config.sensor_bias_range);
        if !(0..=FULL_SCALE_CODE as i32).contains(&code) {
            debug!("{setting:?} = {value} gives code {code}, outside of the DAC range");
        }
        // Codes outside of 16 bits cannot be represented on the wire, keep the low bits.
        let data = code as u16;
        debug!("Setting {setting:?} of {target:?} to {value}{} (code {data:#05x})", setting.unit());
        let address = target.setting_address(setting);
        self.write_register_with_settle(target.subrack, address, data, settle)
    }

    /// Read `setting` of the target channel back in physical units.
    pub fn get_setting(&mut self, target: Target, setting: Setting) -> Result<f64, S::Error> {
        self.get_setting_with_settle(target, setting, self.config.settle_delay)
    }

    /// Same as [Self::get_setting] with a one-off settle delay.
    pub fn get_setting_with_settle(
        &mut self,
        target: Target,
        setting: Setting,
        settle: MillisDurationU32,
    ) -> Result<f64, S::Error> {
        let address = target.setting_address(setting);
        let raw = self.read_register_with_settle(target.subrack, address, settle)?;
        Ok(setting.decode(raw, self.config.sensor_bias_range))
    }

    fn check_range(&self, setting: Setting, value: f64) -> Result<f64, S::Error> {
        let (min, max) = setting.domain(self.config.sensor_bias_range);
        if (min..=max).contains(&value) {
            return Ok(value);
        }
        match self.config.range_policy {
            RangePolicy::Permissive => Ok(value),
            RangePolicy::Clamp => {
                let clamped = value.clamp(min, max);
                warn!(
                    "{setting:?} {value} outside [{min}, {max}]{}, using {clamped}",
                    setting.unit()
                );
                Ok(clamped)
            }
            RangePolicy::Strict => Err(Error::OutOfRange { setting, value }),
        }
    }

    /// Set the output gain. Must be one of ±1, ±1.43, ±2, ±5, ±10, ±14.3, ±20 or ±50.
    ///
    /// Negative gains invert the output.
    pub fn set_output_gain(&mut self, target: Target, gain: f64) -> Result<(), S::Error> {
        let gain = OutputGain::try_from(gain)?;
        self.set_output_gain_step(target, gain)
    }

    /// Set the output gain from the typed gain table.
    pub fn set_output_gain_step(
        &mut self,
        target: Target,
        gain: OutputGain,
    ) -> Result<(), S::Error> {
        self.modify_csr(target, CsrRegister::DriverGain, |register| {
            gain.apply(register, target.channel)
        })
    }

    /// Get the output gain.
    pub fn get_output_gain(&mut self, target: Target) -> Result<f64, S::Error> {
        Ok(self.get_output_gain_step(target)?.value())
    }

    pub fn get_output_gain_step(&mut self, target: Target) -> Result<OutputGain, S::Error> {
        let register = self.read_csr(target.subrack, target.slot, CsrRegister::DriverGain)?;
        Ok(OutputGain::extract(register, target.channel)?)
    }

    /// Set a single-bit control of the target channel, preserving every other bit of its register.
    pub fn set_control(
        &mut self,
        target: Target,
        control: Control,
        value: bool,
    ) -> Result<(), S::Error> {
        self.modify_csr(target, control.register(), |register| {
            control.apply(register, target.channel, value)
        })
    }

    /// Get a single-bit control of the target channel.
    pub fn get_control(&mut self, target: Target, control: Control) -> Result<bool, S::Error> {
        let register = self.read_csr(target.subrack, target.slot, control.register())?;
        Ok(control.extract(register, target.channel))
    }

    /// Close (`true`) or open (`false`) the SQUID feedback loop.
    pub fn set_feedback_loop_closed(
        &mut self,
        target: Target,
        closed: bool,
    ) -> Result<(), S::Error> {
        self.set_control(target, Control::FeedbackLoopClosed, closed)
    }

    pub fn is_feedback_loop_closed(&mut self, target: Target) -> Result<bool, S::Error> {
        self.get_control(target, Control::FeedbackLoopClosed)
    }

    /// Invert (`true`) or restore (`false`) the feedback polarity.
    pub fn set_feedback_polarity_inverted(
        &mut self,
        target: Target,
        inverted: bool,
    ) -> Result<(), S::Error> {
        self.set_control(target, Control::FeedbackPolarityInverted, inverted)
    }

    pub fn is_feedback_polarity_inverted(&mut self, target: Target) -> Result<bool, S::Error> {
        self.get_control(target, Control::FeedbackPolarityInverted)
    }

    /// Take the signal from the preamp (`true`) or from the feedback (`false`).
    pub fn set_source_preamp(&mut self, target: Target, enabled: bool) -> Result<(), S::Error> {
        self.set_control(target, Control::SourcePreamp, enabled)
    }

    pub fn is_source_preamp(&mut self, target: Target) -> Result<bool, S::Error> {
        self.get_control(target, Control::SourcePreamp)
    }

    /// Connect or disconnect the signal generator to the feedback line.
    pub fn connect_signal_generator_feedback(
        &mut self,
        target: Target,
        connect: bool,
    ) -> Result<(), S::Error> {
        self.set_control(target, Control::SignalGeneratorFeedback, connect)
    }

    pub fn is_signal_generator_feedback_connected(
        &mut self,
        target: Target,
    ) -> Result<bool, S::Error> {
        self.get_control(target, Control::SignalGeneratorFeedback)
    }

    /// Connect or disconnect the signal generator to the TES line.
    pub fn connect_signal_generator_tes(
        &mut self,
        target: Target,
        connect: bool,
    ) -> Result<(), S::Error> {
        self.set_control(target, Control::SignalGeneratorTes, connect)
    }

    pub fn is_signal_generator_tes_connected(&mut self, target: Target) -> Result<bool, S::Error> {
        self.get_control(target, Control::SignalGeneratorTes)
    }

    /// Read the whole control register of a board.
    pub fn read_control_register(
        &mut self,
        subrack: u8,
        slot: u8,
    ) -> Result<ControlRegister, S::Error> {
        Ok(ControlRegister::from(self.read_csr(subrack, slot, CsrRegister::Control)?))
    }

    /// Read the whole driver gain register of a board.
    pub fn read_driver_gain_register(
        &mut self,
        subrack: u8,
        slot: u8,
    ) -> Result<DriverGainRegister, S::Error> {
        Ok(DriverGainRegister::from(self.read_csr(subrack, slot, CsrRegister::DriverGain)?))
    }

    /// Read the whole sense-bias register of a board.
    pub fn read_sense_bias_register(
        &mut self,
        subrack: u8,
        slot: u8,
    ) -> Result<SenseBiasRegister, S::Error> {
        Ok(SenseBiasRegister::from(self.read_csr(subrack, slot, CsrRegister::SenseBias)?))
    }

    /// Read a control/status register as a raw word.
    pub fn read_csr(
        &mut self,
        subrack: u8,
        slot: u8,
        register: CsrRegister,
    ) -> Result<u16, S::Error> {
        self.read_register(subrack, csr_address(slot, register))
    }

    /// Read-modify-write of a whole control/status register.
    fn modify_csr(
        &mut self,
        target: Target,
        register: CsrRegister,
        update: impl FnOnce(u16) -> u16,
    ) -> Result<(), S::Error> {
        let address = target.csr_address(register);
        let before = self.read_register(target.subrack, address)?;
        let after = update(before);
        debug!(
            "{register:?} of subrack {} slot {}: {before:#06x} -> {after:#06x}",
            target.subrack, target.slot
        );
        self.write_register(target.subrack, address, after)
    }

    /// Read every setting and control of a channel.
    ///
    /// Each control/status register is read once.
    pub fn read_channel_settings(&mut self, target: Target) -> Result<ChannelSettings, S::Error> {
        let tes_bias_ua = self.get_tes_bias_ua(target)?;
        let squid_bias_ua = self.get_squid_bias_ua(target)?;
        let lock_point_mv = self.get_lock_point_mv(target)?;
        let preamp_gain = self.get_preamp_gain(target)?;
        let output_offset_v = self.get_output_offset_v(target)?;

        let driver_gain = self.read_csr(target.subrack, target.slot, CsrRegister::DriverGain)?;
        let control = self.read_csr(target.subrack, target.slot, CsrRegister::Control)?;
        let sense_bias = self.read_csr(target.subrack, target.slot, CsrRegister::SenseBias)?;
        let channel = target.channel;

        Ok(ChannelSettings {
            tes_bias_ua,
            squid_bias_ua,
            lock_point_mv,
            preamp_gain,
            output_offset_v,
            output_gain: OutputGain::extract(driver_gain, channel)?,
            feedback_loop_closed: Control::FeedbackLoopClosed.extract(control, channel),
            feedback_polarity_inverted: Control::FeedbackPolarityInverted.extract(control, channel),
            signal_generator_feedback: Control::SignalGeneratorFeedback.extract(control, channel),
            source_preamp: Control::SourcePreamp.extract(control, channel),
            signal_generator_tes: Control::SignalGeneratorTes.extract(sense_bias, channel),
        })
    }

    /// Write a raw word to a register: address-select frame, data frame, then settle.
    pub fn write_register(&mut self, subrack: u8, address: u16, data: u16) -> Result<(), S::Error> {
        self.write_register_with_settle(subrack, address, data, self.config.settle_delay)
    }

    /// Same as [Self::write_register] with a one-off settle delay.
    pub fn write_register_with_settle(
        &mut self,
        subrack: u8,
        address: u16,
        data: u16,
        settle: MillisDurationU32,
    ) -> Result<(), S::Error> {
        // Both frames are built first so a bad subrack fails before any bus traffic.
        let address_frame = frame::address_frame(subrack, address)?;
        let data_frame = frame::data_frame(subrack, data, self.config.data_padding)?;

        // Once anything went out the board needs its settle time, even if the write failed.
        let sent = self
            .send(&address_frame)
            .and_then(|()| self.send(&data_frame));
        self.settle(settle);
        sent
    }

    /// Read a raw word from a register: address-select frame, read request, one response line,
    /// then settle.
    ///
    /// The full 16-bit value is returned, setting getters mask it down to the DAC code.
    pub fn read_register(&mut self, subrack: u8, address: u16) -> Result<u16, S::Error> {
        self.read_register_with_settle(subrack, address, self.config.settle_delay)
    }

    /// Same as [Self::read_register] with a one-off settle delay.
    pub fn read_register_with_settle(
        &mut self,
        subrack: u8,
        address: u16,
        settle: MillisDurationU32,
    ) -> Result<u16, S::Error> {
        let address_frame = frame::address_frame(subrack, address)?;

        // Settle on the error path too, the board has already seen the request.
        let value = self.request(&address_frame, address);
        self.settle(settle);
        value
    }

    /// Select `address`, ask for its value and parse the response line.
    fn request(&mut self, address_frame: &str, address: u16) -> Result<u16, S::Error> {
        self.send(address_frame)?;
        self.send(READ_COMMAND)?;
        let line = self.receive_line()?;
        let response = core::str::from_utf8(&line).map_err(|_| Error::InvalidResponse)?;
        let value = frame::parse_response(response)?;
        debug!("FEB -> {response} ({address:#06x} = {value:#06x})");
        Ok(value)
    }

    fn send(&mut self, frame: &str) -> Result<(), S::Error> {
        debug!("FEB <- {frame}");
        let terminator = self.config.line_terminator;
        self.interface
            .write_all(frame.as_bytes())
            .map_err(Error::SerialError)?;
        self.interface
            .write_all(terminator.as_bytes())
            .map_err(Error::SerialError)?;
        self.interface.flush().map_err(Error::SerialError)
    }

    /// Read one response line, without its terminator.
    ///
    /// A line longer than `L` is still consumed up to its terminator, then reported as
    /// [Error::BufferError].
    fn receive_line(&mut self) -> Result<heapless::Vec<u8, L>, S::Error> {
        let terminator = self.config.line_terminator.as_bytes();
        let mut line: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut overflowed = false;

        // One byte at a time, so nothing after the terminator is consumed.
        let mut byte = [0u8; 1];
        loop {
            match self.interface.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if line.is_full() && !line.is_empty() {
                        // Keep only the tail, enough to spot the terminator.
                        line.remove(0);
                        overflowed = true;
                    }
                    line.push(byte[0]).map_err(|_| Error::BufferError)?;
                    if line.ends_with(terminator) {
                        line.truncate(line.len() - terminator.len());
                        break;
                    }
                }
                Err(e) => {
                    // If the bus stops answering part way through a line, use what we have.
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                    ) && !line.is_empty()
                    {
                        break;
                    }
                    return Err(Error::SerialError(e));
                }
            }
        }
        if overflowed {
            debug!("FEB -> response longer than {L} bytes, discarded");
            return Err(Error::BufferError);
        }
        Ok(line)
    }

    fn settle(&mut self, settle: MillisDurationU32) {
        trace!("Settling for {} ms", settle.to_millis());
        self.delay.delay_ms(settle.to_millis());
    }
}
