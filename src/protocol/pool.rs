//! De-duplicating Ordered Pool
//!
//! Satu pool per kelas value per panggilan encode. Posisi 1-based dan stabil
//! sesuai urutan insert pertama.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct Pool<K> {
    items: Vec<K>,
    positions: HashMap<K, u32>,
}

impl<K> Default for Pool<K> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> Pool<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert kalau belum ada. Mengembalikan posisi dan `true` kalau baru.
    pub fn insert(&mut self, key: K) -> (u32, bool) {
        if let Some(&position) = self.positions.get(&key) {
            return (position, false);
        }
        let position = self.items.len() as u32 + 1;
        self.positions.insert(key.clone(), position);
        self.items.push(key);
        (position, true)
    }

    /// Seperti `insert`, tapi hanya clone key kalau memang belum ada
    pub fn insert_ref<Q>(&mut self, key: &Q) -> (u32, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        match self.positions.get(key) {
            Some(&position) => (position, false),
            None => self.insert(key.to_owned()),
        }
    }

    pub fn position<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.positions.get(key).copied()
    }

    /// Item di posisi 1-based
    pub fn get(&self, position: u32) -> Option<&K> {
        position
            .checked_sub(1)
            .and_then(|i| self.items.get(i as usize))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.items.iter()
    }
}
