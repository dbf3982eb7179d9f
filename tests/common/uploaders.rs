//! Test transports for exercising the upload engine.

use batch_uploader::{UploadCompletion, Uploader};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<u32, VecDeque<bool>>,
    calls: HashMap<u32, usize>,
    order: Vec<u32>,
}

/// Answers each attempt from a per-item script after a short delay.
///
/// Items without a script, or whose script ran out, get `fallback`. The
/// uploader also tracks how many attempts are outstanding at once.
#[derive(Clone)]
pub struct ScriptedUploader {
    state: Arc<Mutex<ScriptState>>,
    fallback: bool,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedUploader {
    pub fn new(fallback: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            fallback,
            delay: Duration::from_millis(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answers for successive attempts on `item`
    pub fn script(self, item: u32, answers: &[bool]) -> Self {
        self.state
            .lock()
            .scripts
            .insert(item, answers.iter().copied().collect());
        self
    }

    pub fn calls_for(&self, item: u32) -> usize {
        self.state.lock().calls.get(&item).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Items in the order their first attempt started
    pub fn first_attempt_order(&self) -> Vec<u32> {
        let mut seen = Vec::new();
        for item in &self.state.lock().order {
            if !seen.contains(item) {
                seen.push(*item);
            }
        }
        seen
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Uploader<u32> for ScriptedUploader {
    fn upload(&self, item: u32, completion: UploadCompletion) {
        let answer = {
            let mut state = self.state.lock();
            *state.calls.entry(item).or_insert(0) += 1;
            state.order.push(item);
            state
                .scripts
                .get_mut(&item)
                .and_then(VecDeque::pop_front)
                .unwrap_or(self.fallback)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let in_flight = Arc::clone(&self.in_flight);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            completion.complete(answer);
        });
    }
}

/// Keeps every completion without answering until told to
#[derive(Clone, Default)]
pub struct StallingUploader {
    held: Arc<Mutex<Vec<(u32, UploadCompletion)>>>,
    calls: Arc<AtomicUsize>,
}

impl StallingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` attempts have started
    pub async fn wait_for_calls(&self, count: usize) {
        while self.calls() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Answer every held attempt
    pub fn release_all(&self, success: bool) {
        let held: Vec<_> = self.held.lock().drain(..).collect();
        for (_, completion) in held {
            completion.complete(success);
        }
    }

    pub fn held_items(&self) -> Vec<u32> {
        self.held.lock().iter().map(|(item, _)| *item).collect()
    }
}

impl Uploader<u32> for StallingUploader {
    fn upload(&self, item: u32, completion: UploadCompletion) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.held.lock().push((item, completion));
    }
}
