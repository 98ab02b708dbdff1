/// A minimal main-thread task queue.
///
/// The thread that owns the `EventLoop` drains posted tasks in FIFO order.
/// Any other thread can post through an `EventLoopHandle`, which is also the
/// canonical probe target for the watchdog: if the loop is stuck inside a
/// long task, a probe posted behind it cannot run.
use crate::target::{TargetContext, Task};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

enum Message {
    Run(Task),
    Quit,
}

pub struct EventLoop {
    name: Arc<str>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

/// Cloneable sender side of an `EventLoop`.
#[derive(Clone)]
pub struct EventLoopHandle {
    name: Arc<str>,
    tx: Sender<Message>,
}

impl EventLoop {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel();
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            tx,
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
        }
    }

    /// Run posted tasks on the calling thread until `quit` is posted or
    /// every handle has been dropped. Returns the number of tasks run.
    pub fn run(self) -> usize {
        let EventLoop { name, tx, rx } = self;
        drop(tx);
        tracing::debug!(event_loop = %name, "event loop running");

        let mut ran = 0;
        while let Ok(message) = rx.recv() {
            match message {
                Message::Run(task) => {
                    task();
                    ran += 1;
                }
                Message::Quit => break,
            }
        }

        tracing::debug!(event_loop = %name, tasks = ran, "event loop exited");
        ran
    }

    /// Run every task already queued without blocking.
    ///
    /// A queued `quit` is consumed and stops the drain. Returns the number of
    /// tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(Message::Run(task)) => {
                    task();
                    ran += 1;
                }
                Ok(Message::Quit) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return ran
                }
            }
        }
    }
}

impl EventLoopHandle {
    /// Queue a task. Returns `false` once the loop has exited.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Message::Run(Box::new(task))).is_ok()
    }

    /// Ask the loop to exit after the tasks queued ahead of this call.
    pub fn quit(&self) -> bool {
        self.tx.send(Message::Quit).is_ok()
    }
}

impl TargetContext for EventLoopHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, task: Task) -> bool {
        self.tx.send(Message::Run(task)).is_ok()
    }
}
