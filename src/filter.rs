use std::collections::BTreeSet;

/// Selected category ids for the feed. The empty set means "All"
/// (unfiltered); explicitly selecting every known category is a different
/// state and is never collapsed into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Category ids in stable order, suitable for a request query.
    pub fn ids(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    /// Toggle one category in or out of the selection. Returns true when the
    /// category is selected after the call.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.to_string());
            true
        }
    }

    /// Toggle the "All" pill. Any non-empty selection collapses to "All";
    /// pressing it while already on "All" changes nothing. Returns true when
    /// the selection changed.
    pub fn toggle_all(&mut self) -> bool {
        if self.selected.is_empty() {
            false
        } else {
            self.selected.clear();
            true
        }
    }

    /// Stable identity for this selection, captured at request time and
    /// compared at response time to discard stale pages.
    pub fn filter_key(&self) -> String {
        if self.selected.is_empty() {
            "all".to_string()
        } else {
            self.ids().join(",")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unfiltered() {
        let selection = Selection::new();
        assert!(selection.is_all());
        assert_eq!(selection.filter_key(), "all");
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selection = Selection::new();
        assert!(selection.toggle("food"));
        assert!(selection.contains("food"));
        assert!(!selection.toggle("food"));
        assert!(selection.is_all());
    }

    #[test]
    fn selecting_every_category_is_not_all() {
        let categories = ["food", "travel", "fitness"];
        let mut selection = Selection::new();
        for id in categories {
            selection.toggle(id);
        }
        assert_eq!(selection.len(), categories.len());
        assert!(!selection.is_all());
        assert_ne!(selection.filter_key(), "all");
    }

    #[test]
    fn toggle_all_clears_partial_selection() {
        let mut selection = Selection::new();
        selection.toggle("food");
        selection.toggle("travel");
        assert!(selection.toggle_all());
        assert!(selection.is_all());
        assert_eq!(selection.len(), 0);
    }

    #[test]
    fn toggle_all_on_empty_is_noop() {
        let mut selection = Selection::new();
        assert!(!selection.toggle_all());
        assert!(selection.is_all());
    }

    #[test]
    fn filter_key_is_order_independent() {
        let mut a = Selection::new();
        a.toggle("travel");
        a.toggle("food");
        let mut b = Selection::new();
        b.toggle("food");
        b.toggle("travel");
        assert_eq!(a.filter_key(), b.filter_key());
    }
}
