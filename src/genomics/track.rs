use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while resolving tracks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// No track is registered under the given file name.
    #[error("no track named \"{0}\"")]
    TrackNotFound(String),
}

/// One aligned genome / sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    /// File (or sample) name; the lookup key.
    pub file: String,
    /// Descriptive name, e.g. the FASTA header of the genome.
    pub name: String,
    /// Genome size in bases, `0` if unknown.
    pub size: u64,
}

impl Track {
    /// Track with only a file name set.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }
}

/// Ordered tracks with a file-name index.
///
/// A track's position in the list is its identity everywhere else
/// (LCB regions, variant alleles, tree leaves).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackList {
    tracks: Vec<Track>,
    by_file: HashMap<String, usize>,
}

impl TrackList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all tracks.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.by_file.clear();
    }

    /// Append a track named `file` and return its index.
    ///
    /// When several tracks share a file name the lookup resolves to the first.
    pub fn add_track(&mut self, file: impl Into<String>) -> usize {
        let track = Track::new(file);
        let index = self.tracks.len();
        self.by_file.entry(track.file.clone()).or_insert(index);
        self.tracks.push(track);
        index
    }

    /// Index of the track named `file`, creating it when missing.
    pub fn index_or_add(&mut self, file: &str) -> usize {
        match self.by_file.get(file) {
            Some(&index) => index,
            None => self.add_track(file),
        }
    }

    /// Index of the track named `file`.
    pub fn index_by_file(&self, file: &str) -> Result<usize, TrackError> {
        self.by_file
            .get(file)
            .copied()
            .ok_or_else(|| TrackError::TrackNotFound(file.to_string()))
    }

    /// Track at `index`.
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Set the descriptive name of track `index`.
    pub fn set_name(&mut self, index: usize, name: impl Into<String>) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.name = name.into();
        }
    }

    /// Set the genome size of track `index`.
    pub fn set_size(&mut self, index: usize, size: u64) {
        if let Some(track) = self.tracks.get_mut(index) {
            track.size = size;
        }
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns `true` when there are no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Iterate tracks in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Move every track to a new index: track `old` ends up at `new_by_old[old]`.
    ///
    /// # Panics
    /// Panics if `new_by_old` is not a permutation of `0..len()`.
    pub fn reorder(&mut self, new_by_old: &[usize]) {
        assert_eq!(new_by_old.len(), self.tracks.len(), "remap table size mismatch");
        let mut slots: Vec<Option<Track>> = vec![None; self.tracks.len()];
        for (old, track) in self.tracks.drain(..).enumerate() {
            let new = new_by_old[old];
            assert!(slots[new].is_none(), "remap table is not a permutation");
            slots[new] = Some(track);
        }
        self.tracks = slots.into_iter().flatten().collect();
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.by_file.clear();
        for (index, track) in self.tracks.iter().enumerate() {
            self.by_file.entry(track.file.clone()).or_insert(index);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TrackList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = TrackList::new();
        for file in iter {
            list.add_track(file);
        }
        list
    }
}

/// Old-index → new-index table for reconciling a previously tagged track
/// order (e.g. one fixed by a loaded tree) with the order of a new input.
///
/// New indices are handed out in first-appearance order by [`assign`].
/// Tracks never seen by the input keep their relative order after all
/// assigned ones.
///
/// [`assign`]: TrackRemap::assign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRemap {
    new_by_old: Vec<Option<usize>>,
    next: usize,
}

impl TrackRemap {
    /// Empty remap over `track_count` existing tracks.
    pub fn new(track_count: usize) -> Self {
        Self {
            new_by_old: vec![None; track_count],
            next: 0,
        }
    }

    /// New index of `old`, assigning the next free one on first sight.
    pub fn assign(&mut self, old: usize) -> usize {
        if let Some(new) = self.new_by_old[old] {
            return new;
        }
        let new = self.next;
        self.new_by_old[old] = Some(new);
        self.next += 1;
        new
    }

    /// New index of `old`, if assigned.
    pub fn get(&self, old: usize) -> Option<usize> {
        self.new_by_old.get(old).copied().flatten()
    }

    /// Number of tracks assigned so far.
    pub fn assigned(&self) -> usize {
        self.next
    }

    /// Complete permutation table (`table[old] = new`).
    pub fn into_table(self) -> Vec<usize> {
        let mut next = self.next;
        self.new_by_old
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    let new = next;
                    next += 1;
                    new
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_lazy_creation() {
        let mut tracks: TrackList = ["ref.fna", "a.fna"].into_iter().collect();
        assert_eq!(tracks.index_by_file("a.fna"), Ok(1));
        assert_eq!(tracks.index_or_add("b.fna"), 2);
        assert_eq!(tracks.index_or_add("b.fna"), 2);
        assert_eq!(
            tracks.index_by_file("c.fna"),
            Err(TrackError::TrackNotFound("c.fna".to_string()))
        );
    }

    #[test]
    fn remap_reorders_tracks_and_index() {
        let mut tracks: TrackList = ["a", "b", "c"].into_iter().collect();
        let mut remap = TrackRemap::new(3);
        assert_eq!(remap.assign(2), 0);
        assert_eq!(remap.assign(0), 1);
        assert_eq!(remap.assign(2), 0);
        let table = remap.into_table();
        assert_eq!(table, vec![1, 2, 0]);

        tracks.reorder(&table);
        let files: Vec<_> = tracks.iter().map(|track| track.file.as_str()).collect();
        assert_eq!(files, vec!["c", "a", "b"]);
        assert_eq!(tracks.index_by_file("c"), Ok(0));
        assert_eq!(tracks.index_by_file("b"), Ok(2));
    }
}
