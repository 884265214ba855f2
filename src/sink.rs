use crate::{error::Error, types::Event};
use parking_lot::Mutex;
use std::{io::Write, sync::Arc};

/// A consumer of accepted events.
///
/// Implementations may block. Errors are returned to the caller, never
/// swallowed. An implementation that keeps an event past the call must
/// clone it.
pub trait Sink: Send + Sync {
    fn event(&self, event: &Event) -> Result<(), Error>;
}

impl<S: Sink + ?Sized> Sink for &S {
    fn event(&self, event: &Event) -> Result<(), Error> {
        (**self).event(event)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn event(&self, event: &Event) -> Result<(), Error> {
        (**self).event(event)
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn event(&self, event: &Event) -> Result<(), Error> {
        (**self).event(event)
    }
}

/// The verbose single-line rendering used by [`WriterSink`] and
/// [`crate::EventEncoder`].
pub fn debug_line(event: &Event) -> String {
    format!("{event:?}\n")
}

/// Writes the debug rendering of each event, one per line.
#[derive(Debug)]
pub struct WriterSink<W> {
    output: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(output: W) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    pub fn into_inner(self) -> W {
        self.output.into_inner()
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn event(&self, event: &Event) -> Result<(), Error> {
        let mut out = self.output.lock();
        out.write_all(debug_line(event).as_bytes())?;
        Ok(())
    }
}

/// Keeps a copy of every event it receives.
#[derive(Debug, Default)]
pub struct CaptureSink {
    events: Mutex<Vec<Event>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Drain the captured events.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Sink for CaptureSink {
    fn event(&self, event: &Event) -> Result<(), Error> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Level;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_sink_renders_one_line_per_event() {
        let sink = WriterSink::new(Vec::new());
        let e0 = Event::new(1, Level::Info, "first", 1_u8);
        let e1 = Event::new(2, Level::Error, "second", 2_u8);
        sink.event(&e0).unwrap();
        sink.event(&e1).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Event {"));
        assert!(lines[0].contains("message: \"first\""));
        assert!(lines[1].contains("level: Error"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn writer_sink_returns_write_errors() {
        let sink = WriterSink::new(BrokenPipe);
        let res = sink.event(&Event::new(1, Level::Info, "lost", 0_u8));
        assert!(matches!(res, Err(Error::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn capture_sink_take_drains() {
        let sink = Arc::new(CaptureSink::new());
        let shared: Arc<dyn Sink> = sink.clone();
        shared.event(&Event::new(1, Level::Info, "a", 0_u8)).unwrap();
        shared.event(&Event::new(2, Level::Info, "b", 0_u8)).unwrap();
        assert_eq!(sink.len(), 2);
        let taken = sink.take();
        assert_eq!(taken[1].message, "b");
        assert!(sink.is_empty());
    }
}
