// SPDX-License-Identifier: MIT
//! The progress sink: a channel of `Event` values. Multiple tasks send into
//! the same sink concurrently; `mpsc::UnboundedSender` is itself cheaply
//! cloneable and safe to call from many tasks, so no additional
//! serialization is needed on the producer side (spec.md §5's "callers
//! must be re-entrant" requirement is satisfied by the channel itself).

use tokio::sync::mpsc;

pub use hfd_shared::Event;

#[derive(Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<Event>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            ProgressSink {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink with nowhere to send events — useful for tests and
    /// fire-and-forget calls that don't care about progress.
    pub fn none() -> Self {
        ProgressSink { sender: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(sender) = &self.sender {
            // The receiver may have been dropped (consumer stopped
            // listening); that's not an error for the producer.
            let _ = sender.send(event);
        }
    }
}
