use crate::{error::Error, sink::debug_line, types::Event};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

/// Encodes events into the same one-line rendering as [`crate::WriterSink`],
/// for use with `tokio_util::codec::FramedWrite`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct EventEncoder;

impl<'a> Encoder<&'a Event> for EventEncoder {
    type Error = Error;

    fn encode(&mut self, event: &'a Event, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = debug_line(event);
        dst.reserve(line.len());
        dst.extend_from_slice(line.as_bytes());
        Ok(())
    }
}

impl Encoder<Event> for EventEncoder {
    type Error = Error;

    fn encode(&mut self, event: Event, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&Event>>::encode(self, &event, dst)
    }
}
