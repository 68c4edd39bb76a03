use registry_adapter_core::ServiceEvent;
use tokio::sync::mpsc;

/// The publishing half of the event bus. Cloning it is cheap (it's a
/// bounded channel sender); every reconciliation tick holds one.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<ServiceEvent>,
}

/// The single consuming half. A bus has exactly one receiver: fan-out to
/// multiple listeners, if ever needed, belongs in front of the receiver,
/// not in this channel.
pub struct EventBusReceiver {
    rx: mpsc::Receiver<ServiceEvent>,
}

impl EventBus {
    /// Creates a bounded channel. `capacity` is the backpressure knob: a
    /// consumer slower than the producer fills the channel, at which
    /// point `publish` blocks rather than dropping events or spawning an
    /// unbounded number of tasks to hold them.
    pub fn channel(capacity: usize) -> (Self, EventBusReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, EventBusReceiver { rx })
    }

    /// Publishes an event, waiting for room if the channel is full. A
    /// closed receiver means nobody is listening any more; that is not
    /// this crate's concern to report, so the event is silently dropped.
    pub async fn publish(&self, event: ServiceEvent) {
        let _ = self.tx.send(event).await;
    }
}

impl EventBusReceiver {
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        self.rx.recv().await
    }
}
