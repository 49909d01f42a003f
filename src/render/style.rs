//! Style sink and the in-memory style sheet.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// Destination for published styles.
///
/// `element` names a page element (`"beam"`, `"particle-far-3"`, a target
/// id). Properties are CSS custom properties on the document root, such as
/// `--beam-speed`.
pub trait StyleSink: Send + Sync {
    /// Sets a custom property on the document root.
    fn set_property(&self, name: &str, value: &str);

    /// Adds (`on = true`) or removes a class on an element.
    fn set_class(&self, element: &str, class: &str, on: bool);

    /// Sets an inline style property on an element.
    fn set_element_style(&self, element: &str, property: &str, value: &str);
}

/// Everything written to a [`StyleSheet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyleState {
    /// Root custom properties.
    pub properties: BTreeMap<String, String>,
    /// Classes per element.
    pub classes: BTreeMap<String, BTreeSet<String>>,
    /// Inline styles per element.
    pub element_styles: BTreeMap<String, BTreeMap<String, String>>,
    /// Number of writes that changed something.
    pub writes: u64,
}

/// In-memory [`StyleSink`].
#[derive(Debug, Default)]
pub struct StyleSheet {
    state: Mutex<StyleState>,
}

impl StyleSheet {
    /// Creates an empty sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StyleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of a root custom property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<String> {
        self.lock().properties.get(name).cloned()
    }

    /// Returns `true` if `element` carries `class`.
    #[must_use]
    pub fn has_class(&self, element: &str, class: &str) -> bool {
        self.lock()
            .classes
            .get(element)
            .is_some_and(|set| set.contains(class))
    }

    /// Elements that carry `class`, in name order.
    #[must_use]
    pub fn elements_with_class(&self, class: &str) -> Vec<String> {
        self.lock()
            .classes
            .iter()
            .filter(|(_, set)| set.contains(class))
            .map(|(element, _)| element.clone())
            .collect()
    }

    /// Current inline style property of an element.
    #[must_use]
    pub fn element_style(&self, element: &str, property: &str) -> Option<String> {
        self.lock()
            .element_styles
            .get(element)
            .and_then(|styles| styles.get(property))
            .cloned()
    }

    /// Number of writes that changed the sheet.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    /// Copy of the whole sheet.
    #[must_use]
    pub fn snapshot(&self) -> StyleState {
        self.lock().clone()
    }
}

impl StyleSink for StyleSheet {
    fn set_property(&self, name: &str, value: &str) {
        let mut state = self.lock();
        if state.properties.get(name).map(String::as_str) != Some(value) {
            state.properties.insert(name.to_owned(), value.to_owned());
            state.writes += 1;
        }
    }

    fn set_class(&self, element: &str, class: &str, on: bool) {
        let mut state = self.lock();
        let changed = if on {
            state
                .classes
                .entry(element.to_owned())
                .or_default()
                .insert(class.to_owned())
        } else {
            state
                .classes
                .get_mut(element)
                .is_some_and(|set| set.remove(class))
        };
        if changed {
            state.writes += 1;
        }
    }

    fn set_element_style(&self, element: &str, property: &str, value: &str) {
        let mut state = self.lock();
        let styles = state.element_styles.entry(element.to_owned()).or_default();
        if styles.get(property).map(String::as_str) != Some(value) {
            styles.insert(property.to_owned(), value.to_owned());
            state.writes += 1;
        }
    }
}

/// Formats a float for CSS without trailing noise (`0.5`, `12`, `0.333`).
#[must_use]
pub fn css_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    let mut text = format!("{rounded:.3}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".to_owned();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_count_only_real_changes() {
        let sheet = StyleSheet::new();
        sheet.set_property("--beam-speed", "8s");
        sheet.set_property("--beam-speed", "8s");
        assert_eq!(sheet.property("--beam-speed").as_deref(), Some("8s"));
        assert_eq!(sheet.writes(), 1);

        sheet.set_property("--beam-speed", "5s");
        assert_eq!(sheet.writes(), 2);
    }

    #[test]
    fn classes_toggle() {
        let sheet = StyleSheet::new();
        sheet.set_class("beam", "approaching", true);
        assert!(sheet.has_class("beam", "approaching"));
        sheet.set_class("beam", "approaching", false);
        assert!(!sheet.has_class("beam", "approaching"));

        sheet.set_class("ghost", "active", false);
        assert_eq!(sheet.writes(), 2);
    }

    #[test]
    fn elements_with_class_are_sorted() {
        let sheet = StyleSheet::new();
        sheet.set_class("b", "beam-contact", true);
        sheet.set_class("a", "beam-contact", true);
        sheet.set_class("c", "beam-approaching", true);
        assert_eq!(sheet.elements_with_class("beam-contact"), vec!["a", "b"]);
    }

    #[test]
    fn element_styles_are_per_element() {
        let sheet = StyleSheet::new();
        sheet.set_element_style("p1", "opacity", "0");
        assert_eq!(sheet.element_style("p1", "opacity").as_deref(), Some("0"));
        assert_eq!(sheet.element_style("p2", "opacity"), None);
    }

    #[test]
    fn css_numbers_are_trimmed() {
        assert_eq!(css_number(0.5), "0.5");
        assert_eq!(css_number(12.0), "12");
        assert_eq!(css_number(1.0 / 3.0), "0.333");
        assert_eq!(css_number(-0.0001), "0");
    }
}
