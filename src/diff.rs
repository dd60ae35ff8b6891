/// Pure comparison helpers for snapshot diffing.
///
/// All functions here operate on two in-memory collections and never touch
/// the network, so the same inputs always produce the same diffs.

/// Find items of `new` that are absent from `old`.
///
/// Absence is decided by the `key` projection: an item is new when no element
/// of `old` shares its key. For plain string collections pass the identity
/// projection (`|s| s.as_str()`). Returns `(index, item)` pairs where the
/// index is the item's position in `new`.
pub fn detect_new_items<'a, T>(
    old: &[T],
    new: &'a [T],
    key: impl Fn(&T) -> &str,
) -> Vec<(usize, &'a T)> {
    new.iter()
        .enumerate()
        .filter(|&(_, item)| !old.iter().any(|o| key(o) == key(item)))
        .collect()
}

/// Mirror of [`detect_new_items`]: items of `old` that no longer appear in
/// `new`. Returned references point into `old`.
pub fn detect_removed_items<'a, T>(
    old: &'a [T],
    new: &[T],
    key: impl Fn(&T) -> &str,
) -> Vec<(usize, &'a T)> {
    old.iter()
        .enumerate()
        .filter(|&(_, item)| !new.iter().any(|n| key(n) == key(item)))
        .collect()
}

/// Coarse change signal for ordered lists: true when the lengths differ or
/// any positional element differs. Callers replace the whole list on change
/// rather than patching positions, so no finer-grained diff is produced.
pub fn items_changed<T: PartialEq>(old: &[T], new: &[T]) -> bool {
    if old.len() != new.len() {
        return true;
    }
    old.iter().zip(new.iter()).any(|(a, b)| a != b)
}
