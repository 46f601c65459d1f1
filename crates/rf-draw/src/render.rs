//! Terminal output for a running reveal

use std::io::Write;

use rf_odometer::{CallbackResult, CascadeEvent, CascadeSubscriber, Cue, CueSink, DigitPhase, digits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Redraw one line in place
    Frames,
    /// One JSON object per event
    JsonLines,
}

/// Subscriber that prints the reveal
pub struct Renderer<W> {
    out: W,
    mode: OutputMode,
    width: usize,
}

impl<W: Write + Send> Renderer<W> {
    pub fn new(out: W, mode: OutputMode, width: usize) -> Self {
        Self { out, mode, width }
    }

    fn json(&mut self, event: &CascadeEvent) -> CallbackResult {
        let line = serde_json::to_string(event)?;
        writeln!(self.out, "{}", line)?;
        Ok(())
    }
}

impl<W: Write + Send> CascadeSubscriber for Renderer<W> {
    fn on_tick(&mut self, value: u64) -> CallbackResult {
        match self.mode {
            OutputMode::Frames => {
                write!(self.out, "\r  {}  ", spaced(value, self.width))?;
                self.out.flush()?;
                Ok(())
            }
            OutputMode::JsonLines => self.json(&CascadeEvent::Tick { value }),
        }
    }

    fn on_complete(&mut self, value: u64) -> CallbackResult {
        match self.mode {
            OutputMode::Frames => {
                writeln!(self.out, "\r  {}  ", spaced(value, self.width))?;
                writeln!(self.out, "  Winner: {}", digits::pad(value, self.width))?;
                self.out.flush()?;
                Ok(())
            }
            OutputMode::JsonLines => self.json(&CascadeEvent::Complete { value }),
        }
    }

    fn on_phase(&mut self, position: usize, phase: DigitPhase) -> CallbackResult {
        match self.mode {
            OutputMode::Frames => Ok(()),
            OutputMode::JsonLines => self.json(&CascadeEvent::Phase { position, phase }),
        }
    }
}

/// `1234` at width 6 renders as `0 0 1 2 3 4`
fn spaced(value: u64, width: usize) -> String {
    digits::pad(value, width)
        .chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cue output: terminal bell for ticks, JSON lines in machine mode
pub struct TerminalCues {
    mode: OutputMode,
}

impl TerminalCues {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }
}

impl CueSink for TerminalCues {
    fn play(&mut self, cue: Cue) {
        let mut out = std::io::stdout().lock();
        let written = match self.mode {
            OutputMode::JsonLines => serde_json::to_string(&cue)
                .map_err(std::io::Error::other)
                .and_then(|line| writeln!(out, "{}", line)),
            OutputMode::Frames => match cue {
                Cue::Tick => write!(out, "\x07").and_then(|_| out.flush()),
                Cue::Lock { position } => {
                    log::debug!("lock click for digit {}", position);
                    Ok(())
                }
                Cue::Fanfare { value } => {
                    log::info!("fanfare for {}", value);
                    Ok(())
                }
            },
        };
        if let Err(e) = written {
            log::warn!("Failed to play cue {:?}: {}", cue, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_spaced() {
        assert_eq!(spaced(1234, 6), "0 0 1 2 3 4");
        assert_eq!(spaced(7, 1), "7");
    }

    #[test]
    fn test_frames_mode() {
        let buf = SharedBuf::default();
        let mut renderer = Renderer::new(buf.clone(), OutputMode::Frames, 3);

        renderer.on_tick(5).unwrap();
        renderer.on_phase(0, DigitPhase::Locked).unwrap();
        renderer.on_complete(42).unwrap();

        let text = buf.text();
        assert!(text.starts_with("\r  0 0 5  "));
        assert!(text.contains("Winner: 042"));
    }

    #[test]
    fn test_json_lines_mode() {
        let buf = SharedBuf::default();
        let mut renderer = Renderer::new(buf.clone(), OutputMode::JsonLines, 3);

        renderer.on_tick(5).unwrap();
        renderer.on_phase(2, DigitPhase::Anticipating).unwrap();
        renderer.on_complete(42).unwrap();

        let events: Vec<CascadeEvent> = buf
            .text()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                CascadeEvent::Tick { value: 5 },
                CascadeEvent::Phase {
                    position: 2,
                    phase: DigitPhase::Anticipating
                },
                CascadeEvent::Complete { value: 42 },
            ]
        );
    }
}
