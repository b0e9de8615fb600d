use parking_lot::{Mutex, RwLock};
use rand::{seq::SliceRandom, Rng};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::state::PlaybackState;
use crate::sources::Track;

pub type SharedState = Arc<RwLock<PlaybackState>>;

/// Ordered, thread-safe list of tracks for one guild.
///
/// While the player is playing, index 0 is the track being streamed (the
/// protected head): bulk operations never move or remove it, only
/// [`Queue::pop`] and [`Queue::cycle`] do.
#[derive(Debug)]
pub struct Queue {
    tracks: Mutex<VecDeque<Track>>,
    state: SharedState,
    max_size: usize,
}

impl Queue {
    pub fn new(state: SharedState, max_size: usize) -> Self {
        Self {
            tracks: Mutex::new(VecDeque::new()),
            state,
            max_size,
        }
    }

    fn playing(&self) -> bool {
        self.state.read().playing
    }

    /// Keeps as many tracks as the queue still has room for.
    fn take_within_capacity(&self, current: usize, tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
        let room = self.max_size.saturating_sub(current);
        let mut incoming: Vec<Track> = tracks.into_iter().collect();
        if incoming.len() > room {
            warn!("⚠️ Cola llena: {} de {} tracks descartados", incoming.len() - room, incoming.len());
            incoming.truncate(room);
        }
        incoming
    }

    /// Adds tracks at the end of the queue, returning how many were added.
    pub fn append(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let mut queue = self.tracks.lock();
        let incoming = self.take_within_capacity(queue.len(), tracks);
        let added = incoming.len();
        queue.extend(incoming);
        debug!("➕ {} track(s) agregados al final de la cola", added);
        added
    }

    /// Adds tracks right after the playing track, or at the very start when
    /// nothing plays.
    pub fn prepend(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let mut queue = self.tracks.lock();
        let incoming = self.take_within_capacity(queue.len(), tracks);
        let added = incoming.len();

        let offset = if self.playing() && !queue.is_empty() { 1 } else { 0 };
        let tail = queue.split_off(offset);
        queue.extend(incoming);
        queue.extend(tail);

        debug!("⏭️ {} track(s) agregados como siguientes", added);
        added
    }

    /// Removes the first track. Popping an empty queue does nothing.
    pub fn pop(&self) -> Option<Track> {
        self.tracks.lock().pop_front()
    }

    /// Moves the first track to the end when there is more than one track,
    /// otherwise leaves it in place to be played once more.
    pub fn cycle(&self) {
        let mut queue = self.tracks.lock();
        if queue.len() > 1 {
            if let Some(head) = queue.pop_front() {
                queue.push_back(head);
            }
        }
    }

    pub fn get(&self) -> Option<Track> {
        self.tracks.lock().front().cloned()
    }

    /// Shuffles the queue, keeping the playing track in place.
    pub fn shuffle(&self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) {
        let mut queue = self.tracks.lock();
        if queue.len() < 2 {
            return;
        }

        let start = if self.playing() { 1 } else { 0 };
        queue.make_contiguous()[start..].shuffle(rng);
        info!("🔀 Cola mezclada ({} tracks)", queue.len() - start);
    }

    /// Empties the queue, except for the playing track.
    pub fn clear(&self) {
        let mut queue = self.tracks.lock();
        let playing = self.playing();
        Self::clear_locked(&mut queue, playing);
    }

    fn clear_locked(queue: &mut VecDeque<Track>, playing: bool) {
        if queue.is_empty() {
            return;
        }
        if playing {
            queue.truncate(1);
        } else {
            queue.clear();
        }
        info!("🗑️ Cola limpiada");
    }

    /// Removes the next `n` tracks after the playing one (or the first `n`
    /// when idle). Asking for at least as many as there are removable tracks
    /// is the same as [`Queue::clear`]. Returns how many tracks went away.
    pub fn remove_n(&self, n: usize) -> usize {
        let mut queue = self.tracks.lock();
        let playing = self.playing();
        let protected = usize::from(playing && !queue.is_empty());
        let removable = queue.len() - protected;

        if n >= removable {
            Self::clear_locked(&mut queue, playing);
            return removable;
        }

        queue.drain(protected..protected + n);
        debug!("❌ {} track(s) eliminados de la cola", n);
        n
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }

    /// Total duration of every track in the queue.
    pub fn duration(&self) -> Duration {
        self.tracks.lock().iter().map(Track::duration).sum()
    }

    pub fn duration_string(&self) -> String {
        format_duration_short(self.duration())
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.tracks.lock().iter().cloned().collect()
    }
}

/// Human readable duration limited to its two most significant units.
pub fn format_duration_short(duration: Duration) -> String {
    let rounded = Duration::from_secs(duration.as_secs());
    humantime::format_duration(rounded)
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DirectTrack, Requester, TrackMetadata};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serenity::model::id::UserId;
    use std::collections::HashMap;

    fn track(name: &str) -> Track {
        let meta = TrackMetadata::new(
            name.to_string(),
            format!("https://x.io/{name}"),
            Requester::new(UserId::new(1), "u"),
        )
        .with_duration_ms(60_000);
        DirectTrack::from_metadata(format!("https://x.io/{name}.mp3"), meta).into()
    }

    fn tracks(names: &[&str]) -> Vec<Track> {
        names.iter().map(|n| track(n)).collect()
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.tracks().iter().map(|t| t.title().to_string()).collect()
    }

    fn queue(playing: bool) -> (Queue, SharedState) {
        let state: SharedState = Arc::new(RwLock::new(PlaybackState::new()));
        state.write().playing = playing;
        (Queue::new(Arc::clone(&state), 100), state)
    }

    #[test]
    fn test_append_and_prepend_when_idle() {
        let (q, _) = queue(false);
        q.append(tracks(&["a", "b"]));
        q.prepend(tracks(&["x", "y"]));
        q.append(tracks(&["c"]));
        assert_eq!(titles(&q), vec!["x", "y", "a", "b", "c"]);
    }

    #[test]
    fn test_prepend_while_playing_goes_after_head() {
        let (q, _) = queue(true);
        q.append(tracks(&["a", "b"]));
        q.prepend(tracks(&["x", "y"]));
        assert_eq!(titles(&q), vec!["a", "x", "y", "b"]);

        let (empty, _) = queue(true);
        empty.prepend(tracks(&["x"]));
        assert_eq!(titles(&empty), vec!["x"]);
    }

    #[test]
    fn test_pop_get_and_cycle() {
        let (q, _) = queue(false);
        assert!(q.pop().is_none());
        assert!(q.get().is_none());

        q.append(tracks(&["a", "b", "c"]));
        assert_eq!(q.get().map(|t| t.title().to_string()), Some("a".to_string()));
        q.cycle();
        assert_eq!(titles(&q), vec!["b", "c", "a"]);
        q.pop();
        assert_eq!(titles(&q), vec!["c", "a"]);

        let (single, _) = queue(false);
        single.append(tracks(&["solo"]));
        single.cycle();
        assert_eq!(titles(&single), vec!["solo"]);
    }

    #[test]
    fn test_shuffle_keeps_playing_head() {
        let (q, _) = queue(true);
        q.append(tracks(&["a", "b", "c", "d", "e", "f"]));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            q.shuffle_with(&mut rng);
            let current = titles(&q);
            assert_eq!(current[0], "a");
            let mut sorted = current.clone();
            sorted.sort();
            assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);
        }
    }

    #[test]
    fn test_shuffle_permutations_are_uniform() {
        let (q, _) = queue(true);
        q.append(tracks(&["head", "a", "b", "c"]));
        let mut rng = StdRng::seed_from_u64(1234);
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        for _ in 0..6000 {
            q.shuffle_with(&mut rng);
            *seen.entry(titles(&q)).or_default() += 1;
        }

        assert_eq!(seen.len(), 6);
        for (order, count) in seen {
            assert_eq!(order[0], "head");
            assert!((800..1200).contains(&count), "{order:?} seen {count} times");
        }
    }

    #[test]
    fn test_shuffle_small_queue_is_noop() {
        let (q, _) = queue(false);
        q.append(tracks(&["a"]));
        q.shuffle();
        assert_eq!(titles(&q), vec!["a"]);
    }

    #[test]
    fn test_clear_keeps_playing_head() {
        let (q, state) = queue(true);
        q.append(tracks(&["a", "b", "c"]));
        q.clear();
        assert_eq!(titles(&q), vec!["a"]);

        state.write().playing = false;
        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_n_while_playing() {
        let (q, _) = queue(true);
        q.append(tracks(&["a", "b", "c", "d", "e"]));
        assert_eq!(q.remove_n(2), 2);
        assert_eq!(titles(&q), vec!["a", "d", "e"]);

        assert_eq!(q.remove_n(10), 2);
        assert_eq!(titles(&q), vec!["a"]);
    }

    #[test]
    fn test_remove_n_when_idle() {
        let (q, _) = queue(false);
        q.append(tracks(&["a", "b", "c"]));
        q.remove_n(1);
        assert_eq!(titles(&q), vec!["b", "c"]);
        q.remove_n(2);
        assert!(q.is_empty());
        assert_eq!(q.remove_n(3), 0);
    }

    #[test]
    fn test_capacity_truncates() {
        let state: SharedState = Arc::new(RwLock::new(PlaybackState::new()));
        let q = Queue::new(state, 3);
        assert_eq!(q.append(tracks(&["a", "b"])), 2);
        assert_eq!(q.prepend(tracks(&["x", "y"])), 1);
        assert_eq!(titles(&q), vec!["x", "a", "b"]);
        assert_eq!(q.append(tracks(&["c"])), 0);
    }

    #[test]
    fn test_duration() {
        let (q, _) = queue(false);
        q.append(tracks(&["a", "b", "c"]));
        assert_eq!(q.len(), 3);
        assert_eq!(q.duration(), Duration::from_secs(180));
        assert_eq!(q.duration_string(), "3m");

        assert_eq!(format_duration_short(Duration::from_millis(3_723_400)), "1h 2m");
    }
}
