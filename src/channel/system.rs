use super::Transport;
use crate::config::PortParameters;
use log::debug;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{self, Read, Write};

/// A real serial device.
pub struct SystemPort {
    port: Box<dyn serialport::SerialPort>,
    tx_buffer_size: usize,
}

impl SystemPort {
    pub fn open(
        device: &str,
        baud_rate: u32,
        parameters: &PortParameters,
    ) -> Result<SystemPort, serialport::Error> {
        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(parameters.timeout())
            .open()?;
        debug!(
            "Opened {} with a {} byte transmit queue",
            device, parameters.tx_buffer_size
        );
        Ok(SystemPort {
            port,
            tx_buffer_size: parameters.tx_buffer_size,
        })
    }
}

impl Transport for SystemPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn write_capacity(&mut self) -> io::Result<usize> {
        let queued = self.port.bytes_to_write()? as usize;
        Ok(self.tx_buffer_size.saturating_sub(queued))
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }
}
