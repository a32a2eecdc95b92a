use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{DatasetKind, FetchError};
use crate::config::Selection;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub kind: DatasetKind,
    pub selection: Option<Selection>,
}

impl FetchKey {
    pub fn new(kind: DatasetKind, selection: &Selection) -> Self {
        Self {
            kind,
            selection: kind.is_scoped().then(|| selection.clone()),
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome<T> {
    Ready {
        key: FetchKey,
        value: T,
        elapsed: Duration,
    },
    Failed {
        key: FetchKey,
        error: FetchError,
        elapsed: Duration,
    },
    TimedOut {
        key: FetchKey,
        elapsed: Duration,
    },
}

struct Delivery<T> {
    generation: u64,
    result: Result<T, FetchError>,
}

struct InFlight {
    generation: u64,
    key: FetchKey,
    started_at: Instant,
}

/// One dataset's request lane.
///
/// Every request gets a fresh generation; a delivery is accepted only if
/// its generation is the one currently in flight. Older results are
/// dropped on arrival.
pub struct FetchSlot<T> {
    tx: Sender<Delivery<T>>,
    rx: Receiver<Delivery<T>>,
    generation: u64,
    in_flight: Option<InFlight>,
    discarded: u64,
}

impl<T: Send + 'static> Default for FetchSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> FetchSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            generation: 0,
            in_flight: None,
            discarded: 0,
        }
    }

    pub fn request<F>(&mut self, key: FetchKey, job: F) -> Option<u64>
    where
        F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    {
        if self.in_flight.as_ref().is_some_and(|f| f.key == key) {
            tracing::debug!(dataset = key.kind.as_str(), "same request already in flight");
            return None;
        }

        self.generation += 1;
        let generation = self.generation;
        self.in_flight = Some(InFlight {
            generation,
            key,
            started_at: Instant::now(),
        });

        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = job();
            let _ = tx.send(Delivery { generation, result });
        });
        Some(generation)
    }

    /// Drains arrived results. Returns the outcome of the current request
    /// once it is known, or `TimedOut` when it has been pending longer than
    /// `timeout` (a late result is then discarded like any stale one).
    pub fn poll(&mut self, timeout: Duration) -> Option<FetchOutcome<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(delivery) => {
                    let current = self
                        .in_flight
                        .as_ref()
                        .is_some_and(|f| f.generation == delivery.generation);
                    if !current {
                        self.discarded += 1;
                        tracing::debug!(
                            generation = delivery.generation,
                            "discarding stale fetch result"
                        );
                        continue;
                    }
                    let Some(done) = self.in_flight.take() else {
                        continue;
                    };
                    let elapsed = done.started_at.elapsed();
                    return Some(match delivery.result {
                        Ok(value) => FetchOutcome::Ready {
                            key: done.key,
                            value,
                            elapsed,
                        },
                        Err(error) => FetchOutcome::Failed {
                            key: done.key,
                            error,
                            elapsed,
                        },
                    });
                }
                Err(TryRecvError::Empty) => break,
                // The slot owns a sender, so the channel never disconnects.
                Err(TryRecvError::Disconnected) => break,
            }
        }

        let elapsed = self.in_flight.as_ref()?.started_at.elapsed();
        if elapsed < timeout {
            return None;
        }
        let done = self.in_flight.take()?;
        Some(FetchOutcome::TimedOut {
            key: done.key,
            elapsed,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_key(&self) -> Option<&FetchKey> {
        self.in_flight.as_ref().map(|f| &f.key)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);
    const NO_TIMEOUT: Duration = Duration::from_secs(3600);

    fn key(project: &str) -> FetchKey {
        FetchKey::new(
            DatasetKind::Report,
            &Selection::new(project, vec!["us-central1-a".to_string()]),
        )
    }

    fn gated(value: &'static str) -> (Sender<()>, impl FnOnce() -> Result<&'static str, FetchError>) {
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let job = move || {
            let _ = gate_rx.recv();
            Ok(value)
        };
        (gate_tx, job)
    }

    fn wait_outcome(slot: &mut FetchSlot<&'static str>) -> FetchOutcome<&'static str> {
        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(outcome) = slot.poll(NO_TIMEOUT) {
                return outcome;
            }
            assert!(Instant::now() < deadline, "no outcome within {WAIT:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_discarded(slot: &mut FetchSlot<&'static str>, n: u64) {
        let deadline = Instant::now() + WAIT;
        while slot.discarded() < n {
            assert!(slot.poll(NO_TIMEOUT).is_none());
            assert!(Instant::now() < deadline, "nothing discarded within {WAIT:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn projects_key_ignores_selection() {
        let a = FetchKey::new(DatasetKind::Projects, &Selection::new("a", vec![]));
        let b = FetchKey::new(DatasetKind::Projects, &Selection::new("b", vec![]));
        assert_eq!(a, b);
        assert_ne!(key("a"), key("b"));
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut slot = FetchSlot::new();
        let (release_old, old_job) = gated("old");
        assert_eq!(slot.request(key("old"), old_job), Some(1));
        assert_eq!(slot.request(key("new"), || Ok("new")), Some(2));

        match wait_outcome(&mut slot) {
            FetchOutcome::Ready { key: k, value, .. } => {
                assert_eq!(value, "new");
                assert_eq!(k, key("new"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        release_old.send(()).expect("release");
        wait_discarded(&mut slot, 1);
        assert!(!slot.is_in_flight());
    }

    #[test]
    fn same_key_is_single_flight() {
        let mut slot = FetchSlot::new();
        let (release, job) = gated("first");
        assert_eq!(slot.request(key("p"), job), Some(1));
        assert_eq!(slot.request(key("p"), || Ok("second")), None);
        assert_eq!(slot.generation(), 1);
        assert_eq!(slot.in_flight_key(), Some(&key("p")));

        release.send(()).expect("release");
        match wait_outcome(&mut slot) {
            FetchOutcome::Ready { value, .. } => assert_eq!(value, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Once settled, the same key may be requested again.
        assert_eq!(slot.request(key("p"), || Ok("again")), Some(2));
    }

    #[test]
    fn failure_is_reported_for_current_request() {
        let mut slot: FetchSlot<&'static str> = FetchSlot::new();
        slot.request(key("p"), || Err(FetchError::MissingProject));
        match wait_outcome(&mut slot) {
            FetchOutcome::Failed { error, .. } => {
                assert!(matches!(error, FetchError::MissingProject));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn timed_out_request_result_is_dropped() {
        let mut slot = FetchSlot::new();
        let (release, job) = gated("late");
        slot.request(key("p"), job);
        thread::sleep(Duration::from_millis(20));

        match slot.poll(Duration::from_millis(1)) {
            Some(FetchOutcome::TimedOut { key: k, .. }) => assert_eq!(k, key("p")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!slot.is_in_flight());

        release.send(()).expect("release");
        wait_discarded(&mut slot, 1);
    }

    #[test]
    fn idle_slot_polls_nothing() {
        let mut slot: FetchSlot<&'static str> = FetchSlot::new();
        assert!(slot.poll(Duration::ZERO).is_none());
    }
}
