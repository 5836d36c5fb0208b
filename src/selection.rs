//! Single-selection-per-namespace form state and badge labeling.
//!
//! Ids are namespaced by the prefix before their first hyphen, e.g.
//! `styles-2` belongs to `styles`. The state keeps one slot per namespace,
//! so two ids of the same namespace can never be selected together.
//! Namespaces keep the order they were first selected in; replacing a
//! selection keeps its slot.

/// Namespaces that are auto-filled with their index-1 entry when missing.
pub const REQUIRED_NAMESPACES: [&str; 3] = ["styles", "colors", "aspect"];

/// Default number of badges shown before collapsing into an overflow count.
pub const DEFAULT_MAX_VISIBLE: usize = 5;

/// Namespace of an id: everything before the first `-`, or the whole id.
#[must_use]
pub fn namespace_of(id: &str) -> &str {
    id.split_once('-').map_or(id, |(ns, _)| ns)
}

/// Id for entry `index` of `namespace`.
#[must_use]
pub fn id_for(namespace: &str, index: usize) -> String {
    format!("{namespace}-{index}")
}

/// Catalog index encoded in an id (`styles-3` → 3).
#[must_use]
pub fn index_of(id: &str) -> Option<usize> {
    id.split_once('-').and_then(|(_, rest)| rest.parse().ok())
}

/// Namespace-keyed selection, in first-selected order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    selected: Vec<(String, String)>,
}

impl SelectionState {
    /// Empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection pre-filled with the index-1 default of every required
    /// namespace, which is how a fresh form starts.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut state = Self::new();
        state.fill_required_defaults();
        state
    }

    /// Select `id`, evicting any prior selection in its namespace.
    pub fn select(&mut self, id: &str) {
        let ns = namespace_of(id);
        match self.selected.iter_mut().find(|(n, _)| n == ns) {
            Some((_, slot)) => *slot = id.to_string(),
            None => self.selected.push((ns.to_string(), id.to_string())),
        }
    }

    /// Clear the selection if `id` is selected, otherwise select it.
    pub fn toggle(&mut self, id: &str) {
        let ns = namespace_of(id);
        if self.is_selected(id) {
            self.selected.retain(|(n, _)| n != ns);
        } else {
            self.select(id);
        }
    }

    /// Whether exactly this id is selected.
    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_for(namespace_of(id)) == Some(id)
    }

    /// Selected id for a namespace.
    #[must_use]
    pub fn selected_for(&self, namespace: &str) -> Option<&str> {
        self.selected.iter().find(|(ns, _)| ns == namespace).map(|(_, id)| id.as_str())
    }

    /// All selected ids, in the order their namespaces were first chosen.
    #[must_use]
    pub fn selected_ids(&self) -> Vec<&str> {
        self.selected.iter().map(|(_, id)| id.as_str()).collect()
    }

    /// Drop every selection.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Fill each missing required namespace with its index-1 entry.
    ///
    /// Returns the ids that were injected. Submission is never blocked on
    /// a missing style, color or aspect choice.
    pub fn fill_required_defaults(&mut self) -> Vec<String> {
        let mut filled = Vec::new();
        for ns in REQUIRED_NAMESPACES {
            if self.selected_for(ns).is_none() {
                let id = id_for(ns, 1);
                self.select(&id);
                filled.push(id);
            }
        }
        filled
    }
}

/// Human name for a namespace.
#[must_use]
pub fn human_name_for_namespace(ns: &str) -> String {
    match ns {
        "styles" => "Style".to_string(),
        "colors" => "Color".to_string(),
        "aspect" => "Aspect".to_string(),
        "q1" => "Q1".to_string(),
        "q2" => "Q2".to_string(),
        other => capitalize(other),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Label derived from the id alone: `styles-0` → `Style 1`, `mood-dark` → `Mood dark`.
#[must_use]
pub fn basic_label(id: &str) -> String {
    let Some((ns, rest)) = id.split_once('-') else {
        return human_name_for_namespace(id);
    };
    let human = human_name_for_namespace(ns);
    match rest.parse::<usize>() {
        Ok(n) => format!("{human} {}", n + 1),
        Err(_) => format!("{human} {rest}"),
    }
}

/// Truncate to `max` characters, appending `…` when cut.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Badge rendering for the current selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeLabels {
    /// Labels for the visible badges, in order.
    pub visible: Vec<String>,
    /// Selections hidden behind the `+N` badge.
    pub overflow_count: usize,
}

impl BadgeLabels {
    /// Compute badges; question answers replace their generic labels.
    #[must_use]
    pub fn new(
        selected_ids: &[&str],
        max_visible: usize,
        saved_answer: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let visible = selected_ids
            .iter()
            .take(max_visible)
            .map(|id| label_for(id, &saved_answer))
            .collect();
        Self { visible, overflow_count: selected_ids.len().saturating_sub(max_visible) }
    }
}

/// Label for one badge.
pub fn label_for(id: &str, saved_answer: impl Fn(&str) -> Option<String>) -> String {
    let ns = namespace_of(id);
    if matches!(ns, "q1" | "q2") {
        if let Some(text) = saved_answer(ns).filter(|t| !t.is_empty()) {
            return truncate(&text, 40);
        }
    }
    basic_label(id)
}
