// Filtered projection of the last fetched service list and the cursor on it.

use ratatui::widgets::TableState;

use crate::manager::ServiceUnit;

/// Keeps units whose name contains `filter`, preserving order.
pub fn filter_units(units: &[ServiceUnit], filter: &str) -> Vec<ServiceUnit> {
    units
        .iter()
        .filter(|unit| unit.name.contains(filter))
        .cloned()
        .collect()
}

/// Picks the row to select after the rows changed.
///
/// The previously selected name wins if it is still present. Otherwise the
/// previous index is kept while it is in range, and the first row is the
/// last resort.
pub fn resolve_selection(
    rows: &[ServiceUnit],
    previous_name: Option<&str>,
    previous_index: Option<usize>,
) -> Option<usize> {
    if rows.is_empty() {
        return None;
    }
    if let Some(name) = previous_name {
        if let Some(index) = rows.iter().position(|unit| unit.name == name) {
            return Some(index);
        }
    }
    match previous_index {
        Some(index) if index < rows.len() => Some(index),
        _ => Some(0),
    }
}

#[derive(Debug, Default)]
pub struct ServiceTable {
    units: Vec<ServiceUnit>,
    rows: Vec<ServiceUnit>,
    filter: String,
    state: TableState,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible rows, after filtering.
    pub fn rows(&self) -> &[ServiceUnit] {
        &self.rows
    }

    /// Number of units in the last fetched set.
    pub fn total(&self) -> usize {
        self.units.len()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn state_mut(&mut self) -> &mut TableState {
        &mut self.state
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.state.selected()
    }

    pub fn selected(&self) -> Option<&ServiceUnit> {
        self.state.selected().and_then(|i| self.rows.get(i))
    }

    /// Installs a freshly fetched unit set.
    pub fn replace_units(&mut self, units: Vec<ServiceUnit>) {
        self.units = units;
        self.reproject();
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.filter = filter.to_string();
        self.reproject();
    }

    pub fn push_filter_char(&mut self, c: char) {
        self.filter.push(c);
        self.reproject();
    }

    pub fn pop_filter_char(&mut self) {
        if self.filter.pop().is_some() {
            self.reproject();
        }
    }

    fn reproject(&mut self) {
        let previous_name = self.selected().map(|unit| unit.name.clone());
        let previous_index = self.state.selected();

        self.rows = filter_units(&self.units, &self.filter);
        let selection = resolve_selection(&self.rows, previous_name.as_deref(), previous_index);
        self.state.select(selection);
    }

    pub fn next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= self.rows.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    self.rows.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }
}
