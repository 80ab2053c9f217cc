use std::env;

use inquire::{CustomType, Select};
use serialport::SerialPort;
use tes_feb::{
    delay::StdDelay,
    feb::FebDriver,
    register::{Channel, Target},
};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// Long enough for the board to answer a read request.
const SERIAL_TIMEOUT_MS: u64 = 500;
const SUBRACK: u8 = 0;
const TES_BIAS_UA: f64 = 150.0;
const SQUID_BIAS_UA: f64 = 20.0;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    let slot: u8 = CustomType::new("FEB slot:")
        .with_default(1)
        .prompt()
        .expect("Failed to read slot");

    let channel: Channel = Select::new("Channel:", vec!["A", "B", "C", "D"])
        .prompt()
        .expect("Failed to select channel")
        .parse()
        .expect("Channel names are valid");

    println!("Using port: {}", port_name);

    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let mut feb: FebDriver<PortWrapper, StdDelay> = FebDriver::new(PortWrapper(port), StdDelay);
    let target = Target::new(SUBRACK, slot, channel);

    println!("\n--- Current Channel Settings ---");
    let settings = feb.read_channel_settings(target).unwrap();
    println!("{:#?}", settings);

    // Bias the SQUID with the loop open, then close it.
    feb.set_feedback_loop_closed(target, false).unwrap();
    feb.set_squid_bias_ua(target, SQUID_BIAS_UA).unwrap();
    println!("Set SQUID bias to {}uA", SQUID_BIAS_UA);
    feb.set_feedback_loop_closed(target, true).unwrap();
    println!("Feedback loop closed");

    feb.set_tes_bias_ua(target, TES_BIAS_UA).unwrap();
    println!("Set TES bias to {}uA", TES_BIAS_UA);

    let tes_bias = feb.get_tes_bias_ua(target).unwrap();
    println!("Read back TES bias: {:.2}uA", tes_bias);

    println!("\n--- Updated Channel Settings ---");
    let settings = feb.read_channel_settings(target).unwrap();
    println!("{:#?}", settings);
}
