//! HTTP parameter pollution guard.
//!
//! A repeated query key becomes a single value (the last one sent) unless the
//! key is allow-listed, in which case every value is kept. Handlers that
//! expect a scalar never see a list they did not ask for.

use std::collections::{HashMap, HashSet};

/// Collapse duplicate keys. Keys keep the position of their first occurrence.
/// Returns whether anything was dropped.
pub fn collapse_duplicates(
    pairs: Vec<(String, String)>,
    allow_list: &HashSet<String>,
) -> (Vec<(String, String)>, bool) {
    let mut out: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut changed = false;

    for (key, value) in pairs {
        if allow_list.contains(&key) {
            out.push((key, value));
            continue;
        }
        match seen.get(&key) {
            Some(&slot) => {
                out[slot].1 = value;
                changed = true;
            }
            None => {
                seen.insert(key.clone(), out.len());
                out.push((key, value));
            }
        }
    }
    (out, changed)
}
