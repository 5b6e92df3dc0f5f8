//! SHA-1 pipeline with out-of-order completion and in-order delivery.
//!
//! Digests are computed on the Tokio blocking pool, so several jobs may be
//! in flight at once and finish in any order. Submitters still observe
//! results in submission order: every job takes the next slot in a queue at
//! submission time, completions fill their slot whenever they land, and the
//! queue head is drained only while it holds a finished digest.

use std::collections::VecDeque;

use sha1::{Digest, Sha1};
use tokio::sync::mpsc;

/// Callback invoked with the finished digest, in submission order.
pub type HashCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// Handle for submitting hash jobs to the ordering task.
#[derive(Clone)]
pub struct Hasher {
    jobs: mpsc::UnboundedSender<Job>,
}

struct Job {
    input: Vec<u8>,
    on_done: HashCallback,
}

struct Slot {
    on_done: HashCallback,
    digest: Option<String>,
}

impl Hasher {
    /// Starts the ordering task and returns a handle to it.
    pub fn spawn() -> Self {
        let (jobs, jobs_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(jobs_rx));
        Self { jobs }
    }

    /// Enqueues `input` for hashing and returns immediately. `on_done`
    /// receives the `0x`-prefixed lowercase hex digest later, after every
    /// callback of every earlier submission.
    pub fn hash(&self, input: Vec<u8>, on_done: impl FnOnce(String) + Send + 'static) {
        let _ = self.jobs.send(Job {
            input,
            on_done: Box::new(on_done),
        });
    }
}

/// SHA-1 of `input` as `0x` + 40 lowercase hex digits, 42 bytes total.
pub fn hex_digest(input: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha1::digest(input)))
}

async fn run(mut jobs: mpsc::UnboundedReceiver<Job>) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, String)>();
    let mut slots: VecDeque<Slot> = VecDeque::new();
    // Sequence number of the slot at the queue front.
    let mut head_seq: u64 = 0;
    let mut next_seq: u64 = 0;

    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(Job { input, on_done }) = job else {
                    // All handles dropped; abandon outstanding work.
                    return;
                };
                let seq = next_seq;
                next_seq += 1;
                slots.push_back(Slot { on_done, digest: None });
                let done_tx = done_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let _ = done_tx.send((seq, hex_digest(&input)));
                });
            }
            Some((seq, digest)) = done_rx.recv() => {
                if let Some(slot) = slots.get_mut((seq - head_seq) as usize) {
                    slot.digest = Some(digest);
                }
                while slots.front().is_some_and(|slot| slot.digest.is_some()) {
                    if let Some(slot) = slots.pop_front() {
                        head_seq += 1;
                        if let Some(digest) = slot.digest {
                            (slot.on_done)(digest);
                        }
                    }
                }
            }
        }
    }
}
