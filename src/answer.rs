//! Answer channel: single-producer, single-consumer delivery of generated text.
//!
//! ```text
//!  producer (generator task)                 consumer (CLI / HTTP)
//!  ┌──────────────┐   Chunk, Chunk, …   ┌───────────────┐
//!  │ AnswerSender │ ──────────────────▶ │ AnswerReceiver│
//!  └──────────────┘   Done | Error      └───────────────┘
//! ```
//!
//! The channel is bounded, so [`AnswerSender::send`] waits for the reader
//! to make room. [`AnswerSender::done`] and [`AnswerSender::fail`] consume
//! the sender, which closes the channel exactly once. A sender dropped
//! without either is reported to the reader as [`AnswerError::Interrupted`],
//! so a reader never hangs and never mistakes a crash for an empty answer.

use tokio::sync::mpsc;

use crate::error::AnswerError;

#[derive(Debug)]
enum AnswerEvent {
    Chunk(String),
    Done,
    Error(AnswerError),
}

/// Create a connected sender/receiver pair holding at most `capacity`
/// undelivered events.
pub fn answer_channel(capacity: usize) -> (AnswerSender, AnswerReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        AnswerSender { tx },
        AnswerReceiver {
            rx,
            finished: false,
        },
    )
}

/// Writing half. Owned by the task producing the answer.
#[derive(Debug)]
pub struct AnswerSender {
    tx: mpsc::Sender<AnswerEvent>,
}

impl AnswerSender {
    /// Deliver one chunk. Writes after the reader has gone away are logged
    /// and dropped.
    pub async fn send(&self, chunk: impl Into<String>) {
        if self.tx.send(AnswerEvent::Chunk(chunk.into())).await.is_err() {
            tracing::warn!("answer reader closed; dropping chunk");
        }
    }

    /// Signal successful completion and close the channel.
    pub async fn done(self) {
        if self.tx.send(AnswerEvent::Done).await.is_err() {
            tracing::debug!("answer reader closed before done");
        }
    }

    /// Signal a terminal error and close the channel.
    pub async fn fail(self, err: AnswerError) {
        if self.tx.send(AnswerEvent::Error(err)).await.is_err() {
            tracing::warn!("answer reader closed before error could be delivered");
        }
    }
}

/// Reading half.
#[derive(Debug)]
pub struct AnswerReceiver {
    rx: mpsc::Receiver<AnswerEvent>,
    finished: bool,
}

impl AnswerReceiver {
    /// Pull the next chunk.
    ///
    /// Returns `Some(Ok(chunk))` for data, `Some(Err(_))` once for a terminal
    /// error, and `None` after done. Every call after a terminal event
    /// returns `None`.
    pub async fn recv(&mut self) -> Option<Result<String, AnswerError>> {
        if self.finished {
            return None;
        }

        let event = self.rx.recv().await;
        match event {
            Some(AnswerEvent::Chunk(chunk)) => Some(Ok(chunk)),
            Some(AnswerEvent::Done) => {
                self.finish();
                None
            }
            Some(AnswerEvent::Error(err)) => {
                self.finish();
                Some(Err(err))
            }
            None => {
                self.finish();
                Some(Err(AnswerError::Interrupted))
            }
        }
    }

    /// Read to completion, concatenating every chunk.
    pub async fn collect(mut self) -> Result<String, AnswerError> {
        let mut answer = String::new();
        while let Some(chunk) = self.recv().await {
            answer.push_str(&chunk?);
        }
        Ok(answer)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx.close();
    }
}
