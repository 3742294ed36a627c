use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::api::VideoFile;

#[derive(Debug, PartialEq)]
pub(crate) enum Selection<'a> {
    Selected(&'a VideoFile),
    /// Every catalog item was already delivered to this user.
    Exhausted,
    /// The catalog itself is empty; a storage problem, not a quota one.
    Empty,
}

/// Picks one not-yet-delivered item uniformly at random.
pub(crate) fn select<'a>(
    catalog: &'a [VideoFile],
    delivered: &HashSet<String>,
) -> Selection<'a> {
    if catalog.is_empty() {
        return Selection::Empty;
    }
    let candidates: Vec<&VideoFile> = catalog
        .iter()
        .filter(|video| !delivered.contains(&video.id))
        .collect();
    match candidates.choose(&mut rand::thread_rng()) {
        Some(video) => Selection::Selected(video),
        None => Selection::Exhausted,
    }
}
