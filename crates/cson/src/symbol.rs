//! Symbol table: interned object-member names, referenced elsewhere in
//! this crate only by their numeric `id`.
//!
//! Grounded on the one-hot interning table in
//! `json::schema::intern::Table` (see the teacher's
//! `crates/json/src/schema/intern.rs`), which maps each interned string
//! to a `Set` value with exactly one bit set. That table never removes
//! entries and has no notion of "expect"/pinning; both are added here
//! per spec.

use fxhash::FxHashMap as HashMap;

use crate::error::{Error, Result};

/// A single interned name and its bookkeeping.
#[derive(Debug, Clone)]
struct Entry {
    name: String,
    id: u32,
    refcount: u32,
}

/// Bloom-contribution bit derived from a symbol id: `1 << ((id-1) mod 32)`.
#[inline]
pub fn hash_of(id: u32) -> u32 {
    debug_assert!(id > 0, "symbol id 0 is reserved");
    1u32 << ((id - 1) % 32)
}

/// `SymbolTable` interns object member names into small numeric ids.
///
/// Owned by a [`crate::Context`]; never a process-wide global (Design
/// Notes call for an explicit context handle rather than hidden
/// process state).
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, Entry>,
    next_id: u32,
    /// `expect(ALL)` pin counter: every *future* intern gets this many
    /// extra references on top of the caller's own.
    expect_all: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::default(),
            by_id: HashMap::default(),
            next_id: 1,
            expect_all: 0,
        }
    }

    /// Intern `name`, creating it on first use. Each call increments the
    /// symbol's refcount by one (plus the `expect(ALL)` pin, on the
    /// symbol's very first creation).
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.by_name.get(name) {
            self.by_id.get_mut(&id).unwrap().refcount += 1;
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.to_owned(), id);
        self.by_id.insert(
            id,
            Entry {
                name: name.to_owned(),
                id,
                // The caller's own reference, plus any standing expect(ALL) pins.
                refcount: 1 + self.expect_all,
            },
        );
        id
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<(u32, u32)> {
        let &id = self.by_name.get(name)?;
        Some((id, hash_of(id)))
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|e| e.name.as_str())
    }

    /// Decrement `name`'s refcount, removing it from the table at zero.
    pub fn release(&mut self, name: &str) {
        let Some(&id) = self.by_name.get(name) else {
            tracing::debug!(name, "release of unknown symbol ignored");
            return;
        };
        self.release_id(id);
    }

    /// Decrement a symbol's refcount by id (used by value destructors,
    /// which only carry the numeric id, never the name).
    pub fn release_id(&mut self, id: u32) {
        let remove = match self.by_id.get_mut(&id) {
            Some(entry) => {
                entry.refcount = entry.refcount.saturating_sub(1);
                entry.refcount == 0
            }
            None => {
                tracing::debug!(id, "release of unknown symbol id ignored");
                false
            }
        };
        if remove {
            if let Some(entry) = self.by_id.remove(&id) {
                self.by_name.remove(&entry.name);
            }
        }
    }

    /// Pre-intern and pin `name`: adds one reference beyond the normal
    /// intern-time reference, with no single matching `release` call —
    /// only `forget` removes it. Used to keep well-known names alive
    /// for the process's lifetime regardless of ordinary value churn.
    pub fn expect(&mut self, name: &str) -> u32 {
        let id = self.intern(name);
        self.by_id.get_mut(&id).unwrap().refcount += 1;
        id
    }

    /// Reverse a single `expect(name)` pin.
    pub fn forget(&mut self, name: &str) {
        self.release(name);
    }

    /// `expect(ALL)`: every symbol interned from now on carries one
    /// extra standing reference.
    pub fn expect_all(&mut self) {
        self.expect_all += 1;
    }

    /// `forget(ALL)`: reverse one `expect(ALL)` pin. Errors (logged,
    /// clamped at zero) if the counter is already at zero.
    pub fn forget_all(&mut self) -> Result<()> {
        if self.expect_all == 0 {
            tracing::warn!("forget(ALL) called with no matching expect(ALL); clamped at 0");
            return Err(Error::Overflow);
        }
        self.expect_all -= 1;
        Ok(())
    }

    #[cfg(test)]
    fn refcount(&self, name: &str) -> Option<u32> {
        let id = self.by_name.get(name)?;
        self.by_id.get(id).map(|e| e.refcount)
    }
}
