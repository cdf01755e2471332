use once_cell::sync::OnceCell;
use tracing::trace;
use crate::vm::class::class::ClassRef;
use crate::vm::class::field::FieldRef;
use crate::vm::class::method::MethodRef;
use crate::vm::object::ObjectRef;
use crate::vm::stats::RuntimeStats;

/// Install-once table indexed by constant pool index. A slot never changes once filled,
/// so readers need nothing beyond an acquire load.
pub struct SymbolTable<T> {
    slots: Box<[OnceCell<T>]>,
}

impl<T: Clone> SymbolTable<T> {
    pub fn new(len: usize) -> Self {
        SymbolTable {
            slots: (0..len).map(|_| OnceCell::new()).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize)?.get()
    }

    /// Installs `value` unless the slot is already filled, and returns what the slot
    /// holds afterwards. Racing installers all observe the first winner. Indices outside
    /// the table are not cached and get `value` back.
    pub fn put(&self, index: u32, value: T) -> T {
        match self.slots.get(index as usize) {
            Some(slot) => {
                let mut installed = false;
                let winner = slot.get_or_init(|| {
                    installed = true;
                    value
                });
                if installed {
                    trace!(index, "installed resolved symbol");
                }
                winner.clone()
            }
            None => value
        }
    }
}

impl<T> std::fmt::Debug for SymbolTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = self.slots.iter().filter(|s| s.get().is_some()).count();
        write!(f, "SymbolTable({}/{})", filled, self.slots.len())
    }
}

/// Per defining class cache of everything its constant pool resolved to.
#[derive(Debug)]
pub struct ResolvedSymbolCache {
    pub types: SymbolTable<ClassRef>,
    pub fields: SymbolTable<FieldRef>,
    pub methods: SymbolTable<MethodRef>,
    pub strings: SymbolTable<ObjectRef>,
    /// Types whose initializer has completed, keyed by type index.
    pub initialized_static_storage: SymbolTable<ClassRef>,
    /// Fast path hits and misses of code declared in this class.
    pub stats: RuntimeStats,
}

impl ResolvedSymbolCache {
    pub fn new(constant_pool_len: usize) -> Self {
        ResolvedSymbolCache {
            types: SymbolTable::new(constant_pool_len),
            fields: SymbolTable::new(constant_pool_len),
            methods: SymbolTable::new(constant_pool_len),
            strings: SymbolTable::new(constant_pool_len),
            initialized_static_storage: SymbolTable::new(constant_pool_len),
            stats: RuntimeStats::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use crate::vm::class::cache::SymbolTable;

    #[test]
    fn install_once() {
        let table: SymbolTable<Arc<String>> = SymbolTable::new(4);
        assert!(table.get(1).is_none());

        let first = Arc::new("first".to_string());
        let installed = table.put(1, first.clone());
        assert!(Arc::ptr_eq(&installed, &first));

        let second = table.put(1, Arc::new("second".to_string()));
        assert!(Arc::ptr_eq(&second, &first));
        assert!(Arc::ptr_eq(table.get(1).unwrap(), &first));
    }

    #[test]
    fn out_of_range_is_never_cached() {
        let table: SymbolTable<u32> = SymbolTable::new(2);
        assert_eq!(table.put(7, 3), 3);
        assert_eq!(table.get(7), None);
    }

    #[test]
    fn racing_installers_converge() {
        let table = Arc::new(SymbolTable::<Arc<usize>>::new(1));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8).map(|i| {
            let table = table.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                table.put(0, Arc::new(i))
            })
        }).collect();

        let winners: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = table.get(0).unwrap().clone();
        assert!(winners.iter().all(|w| Arc::ptr_eq(w, &stored)));
    }
}
