use crate::channel::{SerialChannel, Transport};
use crate::error::Error;
use log::{error, trace};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Where device output and operator messages end up. Shared by the listener
/// thread and the interactive loop.
pub type SharedSink = Arc<Mutex<dyn Write + Send>>;

pub(crate) const READ_BUFFER_SIZE: usize = 1024;

/// Starts the thread that copies everything the device sends to `sink`.
/// The thread ends once the channel is closed.
pub fn spawn<T>(
    channel: Arc<SerialChannel<T>>,
    sink: SharedSink,
    poll_interval: Duration,
) -> io::Result<thread::JoinHandle<()>>
where
    T: Transport + 'static,
{
    thread::Builder::new()
        .name("serial-listener".to_string())
        .spawn(move || listen(&channel, &sink, poll_interval))
}

fn listen<T: Transport>(channel: &SerialChannel<T>, sink: &SharedSink, poll_interval: Duration) {
    trace!("Listener started on {}", channel.device());
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    while channel.is_open() {
        match drain(channel, &mut buffer) {
            Ok(0) => thread::sleep(poll_interval),
            Ok(n) => {
                if let Err(e) = display(sink, &buffer[..n]) {
                    error!("Failed to display {} received bytes: {}", n, e);
                }
            }
            Err(Error::ChannelClosed) => break,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                error!("Failed reading from {}: {}", channel.device(), e);
                thread::sleep(poll_interval);
            }
        }
    }
    trace!("Listener stopped");
}

/// Reads whatever is waiting, holding the guard only for the read itself.
fn drain<T: Transport>(channel: &SerialChannel<T>, buffer: &mut [u8]) -> crate::Result<usize> {
    let mut guard = channel.lock()?;
    let n = read_available(guard.transport()?, buffer)?;
    if n > 0 {
        trace!("Received {} bytes", n);
    }
    Ok(n)
}

/// Reads up to `buffer.len()` of the bytes already waiting. Never blocks on
/// an idle line.
pub(crate) fn read_available<T: Transport>(
    transport: &mut T,
    buffer: &mut [u8],
) -> io::Result<usize> {
    let available = transport.bytes_available()?;
    if available == 0 {
        return Ok(0);
    }
    let len = available.min(buffer.len());
    transport.read(&mut buffer[..len])
}

pub(crate) fn display(sink: &SharedSink, bytes: &[u8]) -> io::Result<()> {
    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
    out.write_all(bytes)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::FakeTransport;
    use std::time::Instant;

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn received_bytes_reach_the_sink() {
        let fake = FakeTransport::with_capacity(8);
        let handle = fake.handle();
        let channel = Arc::new(SerialChannel::new("fake0", 115200, fake));
        let output = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: SharedSink = output.clone();

        let listener = spawn(Arc::clone(&channel), sink, Duration::from_millis(1)).unwrap();
        handle.push_inbound(b"U-Boot SPL\r\n");
        wait_for(|| output.lock().unwrap().len() == 12);
        handle.push_inbound(b"=> ");
        wait_for(|| output.lock().unwrap().len() == 15);

        channel.close();
        listener.join().unwrap();
        assert_eq!(output.lock().unwrap().as_slice(), b"U-Boot SPL\r\n=> ");
    }

    #[test]
    fn large_bursts_are_drained_in_pieces() {
        let fake = FakeTransport::with_capacity(8);
        let handle = fake.handle();
        let channel = Arc::new(SerialChannel::new("fake0", 115200, fake));
        let output = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink: SharedSink = output.clone();
        let burst: Vec<u8> = (0..3000).map(|i| (i % 256) as u8).collect();
        handle.push_inbound(&burst);

        let listener = spawn(Arc::clone(&channel), sink, Duration::from_millis(1)).unwrap();
        wait_for(|| output.lock().unwrap().len() == burst.len());
        channel.close();
        listener.join().unwrap();

        assert_eq!(*output.lock().unwrap(), burst);
    }

    #[test]
    fn closing_the_channel_stops_the_thread() {
        let channel = Arc::new(SerialChannel::new(
            "fake0",
            115200,
            FakeTransport::with_capacity(8),
        ));
        let sink: SharedSink = Arc::new(Mutex::new(io::sink()));
        let listener = spawn(Arc::clone(&channel), sink, Duration::from_millis(1)).unwrap();
        channel.close();
        listener.join().unwrap();
    }
}
