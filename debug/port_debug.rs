// A simple application to send debug sequence to the port.

use clap::Parser;
use thiserror::Error;
use vf2_runner::channel::SerialChannel;
use vf2_runner::config::PortParameters;
use vf2_runner::BAUD_RATE;

#[derive(Parser)]
struct Cli {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(long, default_value = "0d")]
    hex_string: String,

    #[arg(long, default_value_t = BAUD_RATE)]
    baud: u32,
}

#[derive(Debug, Error, PartialEq)]
enum HexError {
    #[error("odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("invalid hex byte {0:?} at offset {1}")]
    InvalidByte(String, usize),
}

fn parse_hex_string(in_str: &str) -> Result<Vec<u8>, HexError> {
    if in_str.len() % 2 != 0 {
        return Err(HexError::OddLength(in_str.len()));
    }
    let mut bytes = Vec::with_capacity(in_str.len() / 2);
    for (i, pair) in in_str.as_bytes().chunks(2).enumerate() {
        let text = String::from_utf8_lossy(pair);
        if !pair.iter().all(u8::is_ascii_hexdigit) {
            return Err(HexError::InvalidByte(text.into_owned(), i * 2));
        }
        let byte = u8::from_str_radix(&text, 16)
            .map_err(|_| HexError::InvalidByte(text.to_string(), i * 2))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

fn send_to_port(port_name: &str, baud: u32, bytes: &[u8]) -> vf2_runner::Result<()> {
    let channel = SerialChannel::open(port_name, baud, &PortParameters::default())?;
    channel.write_exclusive(bytes)?;
    channel.close();
    Ok(())
}

fn main() {
    let args = Cli::parse();
    match parse_hex_string(args.hex_string.as_str()) {
        Ok(bytes) => match send_to_port(&args.port, args.baud, &bytes) {
            Ok(()) => println!("Sent {} bytes to {}", bytes.len(), args.port),
            Err(e) => println!("Error {}", e),
        },
        Err(e) => println!("Error {} parsing {}", e, args.hex_string),
    }
}
