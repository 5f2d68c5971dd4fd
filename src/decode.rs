//! Background decoding of image generators.
//!
//! A [`DecodePool`] runs a fixed number of worker threads fed through a channel. Each
//! submission returns a [`DecodeSlot`] that the texture proxy waits on when it is instantiated.
//! If no worker has picked the job up by then, the waiting thread decodes it itself.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::{Error, ImageBuffer, ImageGenerator};

/// Number of decoder threads per pool.
pub(crate) const DECODE_THREADS: usize = 4;

enum DecodeState {
    Queued,
    Decoding,
    Done(Result<ImageBuffer, Error>),
}

/// One pending decode.
pub(crate) struct DecodeSlot {
    generator: Arc<dyn ImageGenerator>,
    state: Mutex<DecodeState>,
    ready: Condvar,
}

impl DecodeSlot {
    fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            generator,
            state: Mutex::new(DecodeState::Queued),
            ready: Condvar::new(),
        }
    }

    fn claim(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, DecodeState::Queued) {
            *state = DecodeState::Decoding;
            return true;
        }
        false
    }

    fn decode(&self) -> Result<ImageBuffer, Error> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.generator.make_buffer()))
            .unwrap_or_else(|_| Err(Error::Decode("decoder panicked".to_string())))
    }

    fn run(&self) {
        if !self.claim() {
            return;
        }
        let result = self.decode();
        *self.state.lock() = DecodeState::Done(result);
        self.ready.notify_all();
    }

    /// Gets the decoded buffer, decoding on this thread if no worker has started yet.
    pub(crate) fn wait(&self) -> Result<ImageBuffer, Error> {
        if self.claim() {
            return self.decode();
        }
        let mut state = self.state.lock();
        loop {
            match std::mem::replace(&mut *state, DecodeState::Decoding) {
                DecodeState::Done(result) => return result,
                pending => {
                    *state = pending;
                    self.ready.wait(&mut state);
                }
            }
        }
    }
}

struct DecodeJob {
    slot: Weak<DecodeSlot>,
}

/// Bounded set of decoder threads shared by all generator proxies of a provider.
///
/// Threads start with the first submission and exit once the pool is dropped.
pub(crate) struct DecodePool {
    sender: Mutex<Option<mpsc::Sender<DecodeJob>>>,
    threads: AtomicUsize,
}

impl DecodePool {
    pub(crate) fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            threads: AtomicUsize::new(0),
        }
    }

    /// Queues `generator` for decoding.
    pub(crate) fn submit(&self, generator: Arc<dyn ImageGenerator>) -> Arc<DecodeSlot> {
        let slot = Arc::new(DecodeSlot::new(generator));
        let mut sender = self.sender.lock();
        let sender = sender.get_or_insert_with(|| self.start());
        let job = DecodeJob {
            slot: Arc::downgrade(&slot),
        };
        if sender.send(job).is_err() {
            log::debug!("no decode threads, decoding at instantiation");
        }
        slot
    }

    /// Number of decoder threads running.
    pub(crate) fn thread_count(&self) -> usize {
        self.threads.load(Ordering::Relaxed)
    }

    fn start(&self) -> mpsc::Sender<DecodeJob> {
        let (sender, receiver) = mpsc::channel::<DecodeJob>();
        let receiver = Arc::new(Mutex::new(receiver));
        for index in 0..DECODE_THREADS {
            let receiver = receiver.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("texsource: decode {index}"))
                .spawn(move || decode_worker(index, receiver));
            match spawned {
                Ok(_) => {
                    self.threads.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    log::debug!("could not start decode thread {index}: {err}");
                    break;
                }
            }
        }
        sender
    }
}

fn decode_worker(index: usize, receiver: Arc<Mutex<mpsc::Receiver<DecodeJob>>>) {
    log::trace!("decode thread {index} started");
    loop {
        let job = receiver.lock().recv();
        let Ok(job) = job else {
            break;
        };
        // The proxy is gone, nobody wants the pixels.
        if let Some(slot) = job.slot.upgrade() {
            slot.run();
        }
    }
    log::trace!("decode thread {index} exiting");
}
