use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const INITIAL_CAPACITY: usize = 128;

/// One automation assignment: `cc` drives `parameter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChangeEntry {
    pub parameter: String,
    pub cc: u8,
}

#[derive(Debug, Default)]
struct Indices {
    by_name: HashMap<String, u8>,
    by_cc: HashMap<u8, Vec<String>>,
}

impl Indices {
    fn remove(&mut self, name: &str) -> Option<u8> {
        let cc = self.by_name.remove(name)?;
        if let Some(names) = self.by_cc.get_mut(&cc) {
            names.retain(|n| n != name);
            if names.is_empty() {
                self.by_cc.remove(&cc);
            }
        }

        Some(cc)
    }
}

/// Two-way lookup between MIDI controller numbers and parameter names.
///
/// One controller may drive several parameters, a parameter listens to one controller at most.
/// Both indices live behind the same lock.
#[derive(Debug)]
pub struct ControlChangeMap {
    indices: Mutex<Indices>,
}

impl ControlChangeMap {
    pub fn new() -> Self {
        ControlChangeMap {
            indices: Mutex::new(Indices {
                by_name: HashMap::with_capacity(INITIAL_CAPACITY),
                by_cc: HashMap::with_capacity(INITIAL_CAPACITY),
            }),
        }
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ControlChangeEntry>,
    {
        let map = ControlChangeMap::new();
        for entry in entries {
            map.add(entry.parameter, entry.cc);
        }

        map
    }

    /// Assigns `cc` to `name`, replacing any previous assignment of `name`.
    pub fn add(&self, name: impl Into<String>, cc: u8) {
        let name = name.into();
        let mut indices = self.indices.lock();
        indices.remove(&name);
        indices.by_cc.entry(cc).or_default().push(name.clone());
        indices.by_name.insert(name, cc);
    }

    pub fn remove(&self, name: &str) -> Option<u8> {
        self.indices.lock().remove(name)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<u8> {
        self.indices.lock().by_name.get(name).copied()
    }

    /// Parameter names driven by `cc`, in assignment order.
    pub fn lookup_by_cc(&self, cc: u8) -> Vec<String> {
        self.indices
            .lock()
            .by_cc
            .get(&cc)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of assigned parameters.
    pub fn len(&self) -> usize {
        self.indices.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut indices = self.indices.lock();
        indices.by_name.clear();
        indices.by_cc.clear();
    }

    /// Visits every assignment with the lock held. Keep `f` short.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, u8),
    {
        let indices = self.indices.lock();
        for (name, cc) in indices.by_name.iter() {
            f(name, *cc);
        }
    }

    /// A copy of all assignments, sorted by parameter name.
    pub fn entries(&self) -> Vec<ControlChangeEntry> {
        let mut entries = Vec::with_capacity(self.len());
        self.for_each(|name, cc| {
            entries.push(ControlChangeEntry {
                parameter: name.to_string(),
                cc,
            })
        });
        entries.sort_by(|a, b| a.parameter.cmp(&b.parameter));

        entries
    }
}

impl Default for ControlChangeMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lookup_both_ways() {
        let map = ControlChangeMap::new();
        map.add("cutoff", 74);
        map.add("resonance", 71);

        assert_eq!(map.lookup_by_name("cutoff"), Some(74));
        assert_eq!(map.lookup_by_cc(71), vec!["resonance".to_string()]);
        assert_eq!(map.lookup_by_name("missing"), None);
        assert!(map.lookup_by_cc(1).is_empty());
    }

    #[test]
    fn test_readd_moves_parameter() {
        let map = ControlChangeMap::new();
        map.add("X", 5);
        map.add("X", 7);

        assert_eq!(map.lookup_by_name("X"), Some(7));
        assert!(!map.lookup_by_cc(5).contains(&"X".to_string()));
        assert_eq!(map.lookup_by_cc(7), vec!["X".to_string()]);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_one_cc_many_parameters() {
        let map = ControlChangeMap::new();
        map.add("env1_attack", 20);
        map.add("env2_attack", 20);
        map.add("env3_attack", 20);

        assert_eq!(
            map.lookup_by_cc(20),
            vec!["env1_attack", "env2_attack", "env3_attack"]
        );

        assert_eq!(map.remove("env2_attack"), Some(20));
        assert_eq!(map.lookup_by_cc(20), vec!["env1_attack", "env3_attack"]);
        assert_eq!(map.remove("env2_attack"), None);
    }

    #[test]
    fn test_entries_and_rebuild() {
        let map = ControlChangeMap::new();
        map.add("b", 2);
        map.add("a", 1);

        let entries = map.entries();
        assert_eq!(entries[0].parameter, "a");
        assert_eq!(entries[1].parameter, "b");

        let rebuilt = ControlChangeMap::from_entries(entries);
        assert_eq!(rebuilt.lookup_by_name("b"), Some(2));

        rebuilt.clear();
        assert!(rebuilt.is_empty());
        assert!(rebuilt.lookup_by_cc(2).is_empty());
    }

    #[test]
    fn test_concurrent_writers_keep_indices_consistent() {
        let map = Arc::new(ControlChangeMap::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..200u32 {
                        map.add(format!("p{}", i % 16), ((i + t) % 8) as u8);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut by_cc_total = 0;
        for cc in 0..8 {
            for name in map.lookup_by_cc(cc) {
                assert_eq!(map.lookup_by_name(&name), Some(cc));
                by_cc_total += 1;
            }
        }
        assert_eq!(by_cc_total, map.len());
        assert_eq!(map.len(), 16);
    }
}
