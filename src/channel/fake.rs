use super::Transport;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    capacities: VecDeque<usize>,
    default_capacity: usize,
    accept_limit: Option<usize>,
    fail_after: Option<usize>,
    write_delay: Option<Duration>,
    timed_out_writes: usize,
    chunks: Vec<Vec<u8>>,
    inbound: VecDeque<u8>,
    capacity_queries: usize,
}

/// Scripted transport used in tests: reports chosen capacities, records every
/// write as a chunk and serves queued inbound bytes.
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

/// Inspects a [`FakeTransport`] after it has been moved into a channel.
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

fn lock(state: &Mutex<FakeState>) -> std::sync::MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeTransport {
    /// Reports `capacity` on every query once the scripted capacities run out.
    pub fn with_capacity(capacity: usize) -> Self {
        let state = FakeState {
            default_capacity: capacity,
            ..FakeState::default()
        };
        FakeTransport {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Capacities reported by the next queries, in order.
    pub fn capacities(self, capacities: impl IntoIterator<Item = usize>) -> Self {
        lock(&self.state).capacities = capacities.into_iter().collect();
        self
    }

    /// Accepts at most `limit` bytes per write call.
    pub fn accept_at_most(self, limit: usize) -> Self {
        lock(&self.state).accept_limit = Some(limit);
        self
    }

    /// Accepts `total` bytes overall, then every write fails.
    pub fn fail_after(self, total: usize) -> Self {
        lock(&self.state).fail_after = Some(total);
        self
    }

    /// The next `count` writes fail with `TimedOut`, as a port whose transmit
    /// queue stays full past its timeout does.
    pub fn time_out_writes(self, count: usize) -> Self {
        lock(&self.state).timed_out_writes = count;
        self
    }

    pub fn write_delay(self, delay: Duration) -> Self {
        lock(&self.state).write_delay = Some(delay);
        self
    }

    pub fn handle(&self) -> FakeHandle {
        FakeHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl FakeHandle {
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        lock(&self.state).chunks.clone()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        lock(&self.state).chunks.iter().map(Vec::len).collect()
    }

    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).chunks.concat()
    }

    pub fn capacity_queries(&self) -> usize {
        lock(&self.state).capacity_queries
    }

    /// Makes `bytes` available to the next reads, as if the device sent them.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes);
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut state = lock(&self.state);
        state.capacities.clear();
        state.default_capacity = capacity;
    }
}

impl Transport for FakeTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let delay = lock(&self.state).write_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = lock(&self.state);
        if state.timed_out_writes > 0 {
            state.timed_out_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let mut n = buf.len();
        if let Some(limit) = state.accept_limit {
            n = n.min(limit);
        }
        if let Some(total) = state.fail_after {
            let so_far: usize = state.chunks.iter().map(Vec::len).sum();
            if so_far >= total {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            n = n.min(total - so_far);
        }
        state.chunks.push(buf[..n].to_vec());
        Ok(n)
    }

    fn write_capacity(&mut self) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.capacity_queries += 1;
        let default = state.default_capacity;
        Ok(state.capacities.pop_front().unwrap_or(default))
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(lock(&self.state).inbound.len())
    }
}
