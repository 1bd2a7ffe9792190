// Operator keyboard: raw-mode key capture and the mapping to bytes for the wire.
use crate::channel::{SerialChannel, Transport};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, info, trace, warn};
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;

/// One keystroke as the interactive loop sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A printable character, sent as UTF-8.
    Char(char),
    /// A control code (Enter, Backspace, Ctrl+letter, ...), sent as one byte.
    Control(u8),
    /// The transfer chord.
    Trigger,
    /// Ctrl+C: the operator wants out.
    Interrupt,
    /// Keys with nothing to send, e.g. arrows or key releases.
    Ignored,
}

pub trait KeySource {
    /// Blocks until the operator presses a key.
    fn next_key(&mut self) -> io::Result<KeyEvent>;
}

/// Scripted keys, then `Interrupt` forever.
impl KeySource for std::vec::IntoIter<KeyEvent> {
    fn next_key(&mut self) -> io::Result<KeyEvent> {
        Ok(self.next().unwrap_or(KeyEvent::Interrupt))
    }
}

/// Keys forwarded by [`spawn_reader`]. A reader that went away counts as an
/// interrupt.
impl KeySource for mpsc::Receiver<io::Result<KeyEvent>> {
    fn next_key(&mut self) -> io::Result<KeyEvent> {
        self.recv().unwrap_or(Ok(KeyEvent::Interrupt))
    }
}

/// Reads keys on their own thread so Ctrl+C is seen even while the
/// interactive loop is busy sending. An interrupt closes `channel` right
/// away, which aborts a transfer in progress, and is then forwarded like
/// any other key. The thread stops after an interrupt or a read error.
pub fn spawn_reader<K, T>(
    mut keys: K,
    channel: Arc<SerialChannel<T>>,
) -> io::Result<mpsc::Receiver<io::Result<KeyEvent>>>
where
    K: KeySource + Send + 'static,
    T: Transport + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("key-reader".to_string())
        .spawn(move || loop {
            let key = keys.next_key();
            let last = match &key {
                Ok(KeyEvent::Interrupt) => {
                    info!("Ctrl+C pressed, closing {}", channel.device());
                    channel.close();
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!("Failed to read the keyboard: {}", e);
                    true
                }
            };
            if sender.send(key).is_err() || last {
                trace!("Key reader stopped");
                break;
            }
        })?;
    Ok(receiver)
}

/// Reads keys from the controlling terminal.
pub struct TerminalKeys {
    trigger: char,
}

impl TerminalKeys {
    pub fn new(trigger: char) -> Self {
        TerminalKeys {
            trigger: trigger.to_ascii_lowercase(),
        }
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> io::Result<KeyEvent> {
        loop {
            if let Event::Key(key) = event::read()? {
                return Ok(classify(self.trigger, key));
            }
        }
    }
}

pub(crate) fn classify(trigger: char, key: event::KeyEvent) -> KeyEvent {
    if key.kind == KeyEventKind::Release {
        return KeyEvent::Ignored;
    }
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char(c) if control => {
            let c = c.to_ascii_lowercase();
            if c == trigger {
                KeyEvent::Trigger
            } else if c == 'c' {
                KeyEvent::Interrupt
            } else if c.is_ascii_alphabetic() {
                KeyEvent::Control(c as u8 & 0x1f)
            } else {
                KeyEvent::Ignored
            }
        }
        KeyCode::Char(c) => KeyEvent::Char(c),
        KeyCode::Enter => KeyEvent::Control(b'\r'),
        KeyCode::Tab => KeyEvent::Control(b'\t'),
        KeyCode::Backspace => KeyEvent::Control(0x08),
        KeyCode::Esc => KeyEvent::Control(0x1b),
        _ => KeyEvent::Ignored,
    }
}

/// Puts the terminal in raw mode and restores it when dropped.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<RawMode> {
        terminal::enable_raw_mode()?;
        debug!("Terminal switched to raw mode");
        Ok(RawMode)
    }

    /// Leaves raw mode. Safe to call more than once, and from a signal
    /// handler thread that has no guard to drop.
    pub fn restore() {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("Failed to restore the terminal: {}", e);
        }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        RawMode::restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::FakeTransport;
    use crossterm::event::KeyEvent as TermKey;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> TermKey {
        TermKey::new(code, modifiers)
    }

    #[test]
    fn trigger_chord_is_intercepted() {
        let key = press(KeyCode::Char('x'), KeyModifiers::CONTROL);
        assert_eq!(classify('x', key), KeyEvent::Trigger);
        let key = press(KeyCode::Char('X'), KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert_eq!(classify('x', key), KeyEvent::Trigger);
    }

    #[test]
    fn plain_letter_is_echoed() {
        let key = press(KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(classify('x', key), KeyEvent::Char('x'));
    }

    #[test]
    fn control_chords_become_control_codes() {
        assert_eq!(
            classify('x', press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyEvent::Interrupt
        );
        assert_eq!(
            classify('x', press(KeyCode::Char('a'), KeyModifiers::CONTROL)),
            KeyEvent::Control(0x01)
        );
        assert_eq!(
            classify('x', press(KeyCode::Enter, KeyModifiers::NONE)),
            KeyEvent::Control(b'\r')
        );
        assert_eq!(
            classify('x', press(KeyCode::Up, KeyModifiers::NONE)),
            KeyEvent::Ignored
        );
    }

    #[test]
    fn releases_are_ignored() {
        let mut key = press(KeyCode::Char('a'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(classify('x', key), KeyEvent::Ignored);
    }

    #[test]
    fn scripted_keys_end_with_interrupt() {
        let mut keys = vec![KeyEvent::Char('a')].into_iter();
        assert_eq!(keys.next_key().unwrap(), KeyEvent::Char('a'));
        assert_eq!(keys.next_key().unwrap(), KeyEvent::Interrupt);
    }

    #[test]
    fn reader_forwards_keys_and_closes_the_channel_on_interrupt() {
        let channel = Arc::new(SerialChannel::new("fake0", 115200, FakeTransport::with_capacity(8)));
        let keys = vec![KeyEvent::Char('a'), KeyEvent::Trigger].into_iter();

        let mut received = spawn_reader(keys, Arc::clone(&channel)).unwrap();

        assert_eq!(received.next_key().unwrap(), KeyEvent::Char('a'));
        assert_eq!(received.next_key().unwrap(), KeyEvent::Trigger);
        assert_eq!(received.next_key().unwrap(), KeyEvent::Interrupt);
        assert!(!channel.is_open());
        // The reader is gone; the receiver keeps answering with interrupts.
        assert_eq!(received.next_key().unwrap(), KeyEvent::Interrupt);
    }

    struct FailingKeys;

    impl KeySource for FailingKeys {
        fn next_key(&mut self) -> io::Result<KeyEvent> {
            Err(io::Error::new(io::ErrorKind::Other, "no terminal"))
        }
    }

    #[test]
    fn reader_forwards_a_read_error_and_stops() {
        let channel = Arc::new(SerialChannel::new("fake0", 115200, FakeTransport::with_capacity(8)));

        let mut received = spawn_reader(FailingKeys, Arc::clone(&channel)).unwrap();

        assert!(received.next_key().is_err());
        assert_eq!(received.next_key().unwrap(), KeyEvent::Interrupt);
        assert!(channel.is_open());
    }
}
