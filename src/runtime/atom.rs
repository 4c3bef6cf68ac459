//! Interned strings.
//!
//! An [`AtomTable`] maps strings to small integer ids and back. Erased ids
//! are recycled first-in first-out before fresh ids are minted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

/// Id of an interned string, valid only for the table that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u64);

impl Atom {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct Tables {
    by_name: HashMap<Arc<str>, Atom>,
    by_id: HashMap<Atom, Arc<str>>,
    /// Retired ids, reused oldest first.
    pool: VecDeque<Atom>,
    next_id: u64,
}

/// Bidirectional string/id table shared by every thread of one execution
/// context. Reads take a shared lock; interning a new string takes the
/// exclusive lock.
#[derive(Default)]
pub struct AtomTable {
    tables: RwLock<Tables>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, interning it if needed.
    pub fn intern(&self, name: &str) -> Atom {
        if let Some(&atom) = self.tables.read().by_name.get(name) {
            return atom;
        }

        let mut tables = self.tables.write();
        // Another writer may have interned it between the two locks
        if let Some(&atom) = tables.by_name.get(name) {
            return atom;
        }

        let atom = match tables.pool.pop_front() {
            Some(atom) => atom,
            None => {
                let atom = Atom(tables.next_id);
                tables.next_id += 1;
                atom
            }
        };

        let name: Arc<str> = Arc::from(name);
        tables.by_name.insert(Arc::clone(&name), atom);
        tables.by_id.insert(atom, name);

        trace!(id = atom.0, "interned atom");
        atom
    }

    pub fn lookup(&self, atom: Atom) -> Option<Arc<str>> {
        self.tables.read().by_id.get(&atom).cloned()
    }

    /// Removes `atom` and retires its id for reuse. Unknown ids are ignored.
    pub fn erase(&self, atom: Atom) {
        let mut tables = self.tables.write();
        if let Some(name) = tables.by_id.remove(&atom) {
            tables.by_name.remove(&name);
            tables.pool.push_back(atom);
        }
    }

    /// Drops every atom and resets id allocation.
    pub fn clear(&self) {
        *self.tables.write() = Tables::default();
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_intern_is_idempotent() {
        let table = AtomTable::new();
        let a = table.intern("ok");
        let b = table.intern("error");
        assert_eq!(table.intern("ok"), a);
        assert_ne!(a, b);
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup() {
        let table = AtomTable::new();
        let a = table.intern("hello");
        assert_eq!(table.lookup(a).as_deref(), Some("hello"));
        assert_eq!(table.lookup(Atom(99)), None);
    }

    #[test]
    fn test_erase_recycles_ids_fifo() {
        let table = AtomTable::new();
        let a = table.intern("a");
        let b = table.intern("b");
        table.intern("c");

        table.erase(b);
        table.erase(a);
        assert_eq!(table.lookup(a), None);
        assert_eq!(table.len(), 1);

        assert_eq!(table.intern("d"), b);
        assert_eq!(table.intern("e"), a);
        assert_eq!(table.intern("f").id(), 3);
    }

    #[test]
    fn test_erase_unknown_is_noop() {
        let table = AtomTable::new();
        table.intern("x");
        table.erase(Atom(42));
        assert_eq!(table.len(), 1);
        assert_eq!(table.intern("y").id(), 1);
    }

    #[test]
    fn test_clear_resets_counter_and_pool() {
        let table = AtomTable::new();
        let a = table.intern("a");
        table.intern("b");
        table.erase(a);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.intern("z").id(), 0);
        assert_eq!(table.intern("w").id(), 1);
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let table = Arc::new(AtomTable::new());
        let names: Vec<String> = (0..64).map(|i| format!("atom{i}")).collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let names = names.clone();
                thread::spawn(move || names.iter().map(|n| table.intern(n)).collect::<Vec<_>>())
            })
            .collect();

        let results: Vec<Vec<Atom>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(other, &results[0]);
        }

        let unique: HashSet<_> = results[0].iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(table.len(), names.len());
        for (name, atom) in names.iter().zip(&results[0]) {
            assert_eq!(table.lookup(*atom).as_deref(), Some(name.as_str()));
        }
    }
}
