//! Where events come from.
//!
//! An [`EventSource`] yields one event at a time, in occurrence order. It
//! only ends by faulting; the engine treats that as fatal and stops.

use crate::error::SourceFault;
use crate::events::KeyEvent;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::info;

/// A sequential, push-style feed of events.
pub trait EventSource {
    fn next_event(&mut self) -> impl Future<Output = Result<KeyEvent, SourceFault>> + Send;
}

/// Reads a physical device through evdev.
pub struct EvdevSource {
    name: String,
    stream: evdev::EventStream,
}

impl EvdevSource {
    pub fn open(device: evdev::Device) -> Result<Self, SourceFault> {
        let name = device.name().unwrap_or("<unnamed>").to_string();
        let stream = device.into_event_stream()?;
        info!("Reading events from {:?}.", name);
        Ok(Self { name, stream })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl EventSource for EvdevSource {
    async fn next_event(&mut self) -> Result<KeyEvent, SourceFault> {
        let event = self.stream.next_event().await?;
        Ok(KeyEvent::from(event))
    }
}

/// Events pushed by another task, e.g. the interactive shell or a test.
///
/// Once every sender is dropped the source reports [`SourceFault::Closed`].
pub struct ChannelSource {
    receiver: mpsc::Receiver<KeyEvent>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<KeyEvent>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<KeyEvent, SourceFault> {
        self.receiver.recv().await.ok_or(SourceFault::Closed)
    }
}
