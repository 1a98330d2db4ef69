use log::debug;
use serde::{Deserialize, Serialize};

use crate::state::Chip;

/// Uploaded query chips, keyed by `chip_id`, in insertion order.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChipRegistry {
    chips: Vec<Chip>,
}

impl ChipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chip` unless its id is already registered.
    pub fn insert(&mut self, chip: Chip) -> bool {
        if self.contains(&chip.chip_id) {
            debug!("chip {} already registered, skipping", chip.chip_id);
            return false;
        }
        self.chips.push(chip);
        true
    }

    /// Removing an unknown id is a no-op.
    pub fn remove(&mut self, chip_id: &str) -> Option<Chip> {
        let pos = self.chips.iter().position(|c| c.chip_id == chip_id)?;
        Some(self.chips.remove(pos))
    }

    pub fn contains(&self, chip_id: &str) -> bool {
        self.chips.iter().any(|c| c.chip_id == chip_id)
    }

    pub fn get(&self, chip_id: &str) -> Option<&Chip> {
        self.chips.iter().find(|c| c.chip_id == chip_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.chips.iter().map(|c| c.chip_id.clone()).collect()
    }

    pub fn chips(&self) -> &[Chip] {
        &self.chips
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip(id: &str) -> Chip {
        Chip {
            chip_id: id.into(),
            filename: format!("{}.tif", id),
            preview_ref: format!("/preview/{}", id),
            shape: None,
        }
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut reg = ChipRegistry::new();
        reg.insert(chip("b"));
        reg.insert(chip("a"));
        reg.insert(chip("c"));
        assert_eq!(reg.ids(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut reg = ChipRegistry::new();
        assert!(reg.insert(chip("a")));
        assert!(!reg.insert(chip("a")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove_present_chip() {
        let mut reg = ChipRegistry::new();
        reg.insert(chip("a"));
        reg.insert(chip("b"));
        let removed = reg.remove("a");
        assert_eq!(removed.map(|c| c.chip_id), Some("a".to_string()));
        assert_eq!(reg.len(), 1);
        assert!(!reg.contains("a"));
        assert!(reg.get("b").is_some());
    }

    #[test]
    fn test_remove_absent_chip_is_noop() {
        let mut reg = ChipRegistry::new();
        reg.insert(chip("a"));
        let before = reg.clone();
        assert!(reg.remove("zzz").is_none());
        assert_eq!(reg, before);
        assert!(reg.remove("a").is_some());
        assert!(reg.remove("a").is_none());
        assert!(reg.is_empty());
    }
}
