//! Pending-task coalescing.
//!
//! Touch input arrives far faster than the display refreshes. Producers
//! never talk to the voice pool directly; they fold their intent into an
//! insertion-ordered queue holding at most one task per touch id, and the
//! engine drains the whole queue once per frame. Coalescing is a pure
//! function over a tagged union, so the rules are testable without timing.

use super::{NoteId, TouchId};

/// Upper bound on synchronous re-drains within one frame. Tasks enqueued by
/// re-entrant producer calls during a drain run in the same tick instead of
/// waiting a frame; the bound keeps a pathological producer from starving
/// the caller.
pub const MAX_DRAIN_PASSES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingTask {
    Start {
        frequency: f32,
        velocity: f32,
        y_position: f32,
        note_id: NoteId,
    },
    Update {
        frequency: f32,
        velocity: f32,
        y_position: f32,
    },
    Release {
        /// Note the release targets, when one was sounding at enqueue time.
        /// Lets the executor drop a release that outlived its note.
        note_id: Option<NoteId>,
    },
}

/// Coalesce an incoming task with whatever is already pending for the same
/// touch id.
///
/// | existing \ incoming | Start      | Update                   | Release |
/// |---------------------|------------|--------------------------|---------|
/// | none                | Start      | Update                   | Release |
/// | Start               | Start(new) | Start with new payload   | Release |
/// | Update              | Start(new) | Update with new payload  | Release |
/// | Release             | Start(new) | Release (update dropped) | Release |
///
/// Two asymmetries are deliberate: an update never un-queues a release
/// already in flight, and a pending Start keeps its action (and its freshly
/// minted note id) while absorbing the newest parameters. A Release does
/// erase a same-frame pending Start, so a tap released within one frame
/// never sounds.
pub fn merge(existing: Option<PendingTask>, incoming: PendingTask) -> PendingTask {
    match (existing, incoming) {
        (Some(release @ PendingTask::Release { .. }), PendingTask::Update { .. }) => release,
        (
            Some(PendingTask::Start { note_id, .. }),
            PendingTask::Update {
                frequency,
                velocity,
                y_position,
            },
        ) => PendingTask::Start {
            frequency,
            velocity,
            y_position,
            note_id,
        },
        (_, incoming) => incoming,
    }
}

/// At most one pending task per touch id; iteration follows the order each
/// id was first established since the last drain. Touch counts are small,
/// so a linear scan beats hashing and keeps the ordering guarantee trivial.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: Vec<(TouchId, PendingTask)>,
}

impl TaskQueue {
    pub fn push(&mut self, touch: TouchId, incoming: PendingTask) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(id, _)| *id == touch) {
            *existing = merge(Some(*existing), incoming);
        } else {
            self.entries.push((touch, merge(None, incoming)));
        }
    }

    /// Take ownership of every pending task, leaving the queue empty for
    /// re-entrant producers.
    pub fn take(&mut self) -> Vec<(TouchId, PendingTask)> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, touch: TouchId) -> Option<&PendingTask> {
        self.entries
            .iter()
            .find(|(id, _)| *id == touch)
            .map(|(_, task)| task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(note_id: NoteId) -> PendingTask {
        PendingTask::Start {
            frequency: 440.0,
            velocity: 0.8,
            y_position: 0.5,
            note_id,
        }
    }

    fn update(frequency: f32) -> PendingTask {
        PendingTask::Update {
            frequency,
            velocity: 0.8,
            y_position: 0.6,
        }
    }

    #[test]
    fn update_over_start_keeps_action_and_note_id() {
        let merged = merge(Some(start(7)), update(550.0));
        match merged {
            PendingTask::Start {
                frequency, note_id, ..
            } => {
                assert_eq!(frequency, 550.0);
                assert_eq!(note_id, 7);
            }
            other => panic!("expected Start, got {other:?}"),
        }
    }

    #[test]
    fn update_over_release_is_dropped() {
        let release = PendingTask::Release { note_id: Some(3) };
        assert_eq!(merge(Some(release), update(550.0)), release);
    }

    #[test]
    fn release_erases_pending_start() {
        let merged = merge(Some(start(1)), PendingTask::Release { note_id: None });
        assert_eq!(merged, PendingTask::Release { note_id: None });
    }

    #[test]
    fn start_replaces_pending_release() {
        let merged = merge(Some(PendingTask::Release { note_id: Some(1) }), start(2));
        assert_eq!(merged, start(2));
    }

    #[test]
    fn rapid_updates_collapse_to_last_payload() {
        let mut queue = TaskQueue::default();
        queue.push(9, update(440.0));
        queue.push(9, update(493.9));
        queue.push(9, update(523.3));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(9), Some(&update(523.3)));
    }

    #[test]
    fn queue_preserves_first_established_key_order() {
        let mut queue = TaskQueue::default();
        queue.push(2, start(1));
        queue.push(5, start(2));
        queue.push(2, update(660.0)); // merge must not move touch 2 back

        let order: Vec<TouchId> = queue.take().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![2, 5]);
    }

    #[test]
    fn take_leaves_queue_empty() {
        let mut queue = TaskQueue::default();
        queue.push(1, start(1));
        let batch = queue.take();
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());
    }
}
