//! Result hand-off from probe loops to the single collector.

use tokio::sync::mpsc;

use crate::history::Sample;

/// Create the shared result channel.
///
/// The channel is unbounded so that publishing never blocks or drops.
pub fn result_channel() -> (ResultSender, ResultDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, ResultDrain { rx })
}

/// Producer half, cloned into every probe loop.
#[derive(Debug, Clone)]
pub struct ResultSender {
    tx: mpsc::UnboundedSender<Sample>,
}

impl ResultSender {
    /// Publish a sample. Returns `false` once the drain has been dropped.
    pub fn publish(&self, sample: Sample) -> bool {
        self.tx.send(sample).is_ok()
    }
}

/// Consumer half. There is exactly one.
#[derive(Debug)]
pub struct ResultDrain {
    rx: mpsc::UnboundedReceiver<Sample>,
}

impl ResultDrain {
    /// Take everything currently queued without waiting for more.
    pub fn drain(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        self.drain_with(|sample| samples.push(sample));
        samples
    }

    /// Feed every queued sample to `f` in arrival order and return how many
    /// there were. Never waits.
    pub fn drain_with<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(Sample),
    {
        let mut count = 0;
        while let Ok(sample) = self.rx.try_recv() {
            f(sample);
            count += 1;
        }
        count
    }
}
