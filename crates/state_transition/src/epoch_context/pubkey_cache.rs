//! Bidirectional pubkey <-> validator index map shared between chain branches.
//!
//! Entries live in layers. A handle sees its layer up to `len` plus, through the parent links,
//! every ancestor entry below the index where the child layer starts. Appending on a handle that
//! is behind the tip of its layer either follows the existing entry (same branch history) or, on
//! a conflict, starts a new layer. Earlier handles never observe entries past their own `len`.

use std::{collections::HashMap, sync::Arc};

use ember_bls::PubKey;
use parking_lot::RwLock;

use crate::errors::EpochContextError;

#[derive(Debug, Default)]
struct Entries {
    pubkeys: Vec<PubKey>,
    indices: HashMap<PubKey, u64>,
}

#[derive(Debug)]
struct Layer {
    parent: Option<Arc<Layer>>,
    /// Global index of the first entry stored in this layer.
    start: u64,
    entries: RwLock<Entries>,
}

impl Layer {
    fn root() -> Self {
        Self {
            parent: None,
            start: 0,
            entries: RwLock::new(Entries::default()),
        }
    }

    fn len(&self) -> u64 {
        self.start + self.entries.read().pubkeys.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct PubkeyCache {
    layer: Arc<Layer>,
    len: u64,
}

impl Default for PubkeyCache {
    fn default() -> Self {
        Self {
            layer: Arc::new(Layer::root()),
            len: 0,
        }
    }
}

impl PubkeyCache {
    pub fn from_pubkeys<'a, I: IntoIterator<Item = &'a PubKey>>(
        pubkeys: I,
    ) -> Result<Self, EpochContextError> {
        let mut cache = Self::default();
        for pubkey in pubkeys {
            cache.insert(cache.len, pubkey.clone())?;
        }
        Ok(cache)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Records `pubkey` at `index`, which must be the next index of this handle's view.
    ///
    /// Re-inserting the pubkey already recorded at `index` is a no-op.
    pub fn insert(&mut self, index: u64, pubkey: PubKey) -> Result<(), EpochContextError> {
        if index < self.len {
            return match self.get_pubkey(index) {
                Some(existing) if existing == pubkey => Ok(()),
                _ => Err(EpochContextError::PubkeyIndexGap {
                    index,
                    len: self.len,
                }),
            };
        }
        if index != self.len {
            return Err(EpochContextError::PubkeyIndexGap {
                index,
                len: self.len,
            });
        }

        {
            let mut entries = self.layer.entries.write();
            let tip = self.layer.start + entries.pubkeys.len() as u64;
            if tip == index {
                entries.indices.insert(pubkey.clone(), index);
                entries.pubkeys.push(pubkey);
                self.len += 1;
                return Ok(());
            }
            let offset = index.saturating_sub(self.layer.start) as usize;
            if index >= self.layer.start && entries.pubkeys.get(offset) == Some(&pubkey) {
                self.len += 1;
                return Ok(());
            }
        }

        // Another branch already appended a different key here.
        let mut entries = Entries::default();
        entries.indices.insert(pubkey.clone(), index);
        entries.pubkeys.push(pubkey);
        self.layer = Arc::new(Layer {
            parent: Some(self.layer.clone()),
            start: index,
            entries: RwLock::new(entries),
        });
        self.len += 1;
        Ok(())
    }

    /// Shortens this handle's view to the first `len` entries, e.g. when it is reused for a
    /// state on another branch with a shorter registry. Other handles are unaffected.
    pub fn truncate(&mut self, len: u64) {
        self.len = self.len.min(len);
        // Drop back to the layer that owns the new tip, so appends never land below `start`.
        while self.layer.start > 0 && self.layer.start >= self.len {
            let Some(parent) = self.layer.parent.clone() else {
                break;
            };
            self.layer = parent;
        }
    }

    pub fn get_index(&self, pubkey: &PubKey) -> Option<u64> {
        let mut layer = &self.layer;
        let mut bound = self.len;
        loop {
            let found = layer.entries.read().indices.get(pubkey).copied();
            if let Some(index) = found.filter(|&index| index < bound) {
                return Some(index);
            }
            match &layer.parent {
                Some(parent) => {
                    bound = bound.min(layer.start);
                    layer = parent;
                }
                None => return None,
            }
        }
    }

    pub fn get_pubkey(&self, index: u64) -> Option<PubKey> {
        if index >= self.len {
            return None;
        }
        let mut layer = &self.layer;
        loop {
            if index >= layer.start {
                return layer
                    .entries
                    .read()
                    .pubkeys
                    .get((index - layer.start) as usize)
                    .cloned();
            }
            layer = layer.parent.as_ref()?;
        }
    }

    /// Whether this handle still appends in place, without having been overtaken by another
    /// branch sharing its layer.
    pub fn is_tip(&self) -> bool {
        self.layer.len() == self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(byte: u8) -> PubKey {
        PubKey::from_bytes(&[byte; 48]).expect("valid length")
    }

    #[test]
    fn test_lookup_both_directions() {
        let keys = [pubkey(1), pubkey(2), pubkey(3)];
        let cache = PubkeyCache::from_pubkeys(keys.iter()).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_index(&pubkey(2)), Some(1));
        assert_eq!(cache.get_pubkey(2), Some(pubkey(3)));
        assert_eq!(cache.get_index(&pubkey(9)), None);
        assert_eq!(cache.get_pubkey(3), None);
    }

    #[test]
    fn test_insert_rejects_gaps() {
        let mut cache = PubkeyCache::default();
        assert_eq!(
            cache.insert(1, pubkey(1)),
            Err(EpochContextError::PubkeyIndexGap { index: 1, len: 0 })
        );
        cache.insert(0, pubkey(1)).unwrap();
        cache.insert(0, pubkey(1)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_conflicting_branches_fork_the_cache() {
        let mut base = PubkeyCache::default();
        base.insert(0, pubkey(1)).unwrap();
        base.insert(1, pubkey(2)).unwrap();

        let mut branch_a = base.clone();
        let mut branch_b = base.clone();
        branch_a.insert(2, pubkey(10)).unwrap();
        assert!(branch_a.is_tip());
        assert!(!branch_b.is_tip());

        // The original handle does not see the append made through branch A.
        assert_eq!(base.get_index(&pubkey(10)), None);

        branch_b.insert(2, pubkey(20)).unwrap();
        assert_eq!(branch_b.get_pubkey(2), Some(pubkey(20)));
        assert_eq!(branch_b.get_index(&pubkey(20)), Some(2));
        assert_eq!(branch_b.get_index(&pubkey(10)), None);
        assert_eq!(branch_b.get_index(&pubkey(2)), Some(1));

        assert_eq!(branch_a.get_pubkey(2), Some(pubkey(10)));
        assert_eq!(branch_a.get_index(&pubkey(20)), None);
    }

    #[test]
    fn test_agreeing_branches_share_entries() {
        let mut base = PubkeyCache::default();
        base.insert(0, pubkey(1)).unwrap();
        let mut branch_a = base.clone();
        let mut branch_b = base.clone();
        branch_a.insert(1, pubkey(2)).unwrap();
        branch_b.insert(1, pubkey(2)).unwrap();
        assert!(Arc::ptr_eq(&branch_a.layer, &branch_b.layer));
        assert_eq!(branch_b.get_index(&pubkey(2)), Some(1));
    }

    #[test]
    fn test_truncate_below_fork_then_insert() {
        let mut base = PubkeyCache::default();
        base.insert(0, pubkey(1)).unwrap();
        base.insert(1, pubkey(2)).unwrap();
        let mut branch_a = base.clone();
        let mut branch_b = base.clone();
        branch_a.insert(2, pubkey(10)).unwrap();
        branch_b.insert(2, pubkey(20)).unwrap();

        branch_b.truncate(1);
        assert_eq!(branch_b.len(), 1);
        assert_eq!(branch_b.get_index(&pubkey(2)), None);
        assert_eq!(branch_b.get_index(&pubkey(20)), None);

        branch_b.insert(1, pubkey(30)).unwrap();
        assert_eq!(branch_b.get_pubkey(1), Some(pubkey(30)));
        assert_eq!(branch_b.get_index(&pubkey(30)), Some(1));
        assert_eq!(branch_b.get_index(&pubkey(1)), Some(0));
        assert_eq!(branch_b.get_index(&pubkey(2)), None);

        // The other branches keep their own history.
        assert_eq!(branch_a.get_pubkey(1), Some(pubkey(2)));
        assert_eq!(branch_a.get_index(&pubkey(10)), Some(2));
        assert_eq!(base.get_index(&pubkey(30)), None);
    }

    #[test]
    fn test_truncate_to_shared_prefix_follows_existing_entries() {
        let mut base = PubkeyCache::default();
        for byte in 1..=4 {
            base.insert(u64::from(byte) - 1, pubkey(byte)).unwrap();
        }
        let mut reused = base.clone();
        reused.truncate(2);
        reused.insert(2, pubkey(3)).unwrap();
        assert_eq!(reused.get_index(&pubkey(3)), Some(2));
        assert_eq!(reused.get_index(&pubkey(4)), None);
        assert!(Arc::ptr_eq(&reused.layer, &base.layer));
    }
}
