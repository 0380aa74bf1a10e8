/// A recovered list of content items.
///
/// Invariant: at least one item, and every item is non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSummary {
    items: Vec<String>,
}

impl ParsedSummary {
    /// Trims items and drops blank ones. Returns `None` when nothing remains.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = String>) -> Option<Self> {
        let items: Vec<String> = items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<String> {
        self.items
    }
}
