//! Process-wide UI state (active page, open notebook tabs, overlays) as an
//! explicit value with pure transitions, held by the top-level controller.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePage {
    Home,
    Sparks,
    Inbox,
    Notebooks,
    Notebook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTab {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    pub active_page: ActivePage,
    pub open_tabs: Vec<OpenTab>,
    pub active_tab_id: Option<String>,
    pub spark_canvas_visible: bool,
    pub selected_spark_root_id: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_page: ActivePage::Home,
            open_tabs: Vec::new(),
            active_tab_id: None,
            spark_canvas_visible: false,
            selected_spark_root_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    NavigateTo(ActivePage),
    OpenNotebookTab { id: String, label: String },
    CloseTab(String),
    SetActiveTab(String),
    OpenSparkCanvas,
    CloseSparkCanvas,
    SelectSpark(Option<String>),
}

impl UiState {
    /// Pure transition: consumes an event and yields the next state.
    pub fn apply(&self, event: UiEvent) -> UiState {
        let mut next = self.clone();
        match event {
            UiEvent::NavigateTo(page) => {
                next.active_page = page;
                if page != ActivePage::Notebook {
                    next.active_tab_id = None;
                }
            }
            UiEvent::OpenNotebookTab { id, label } => {
                if !next.open_tabs.iter().any(|tab| tab.id == id) {
                    next.open_tabs.push(OpenTab {
                        id: id.clone(),
                        label,
                    });
                }
                next.active_tab_id = Some(id);
                next.active_page = ActivePage::Notebook;
            }
            UiEvent::CloseTab(id) => {
                next.open_tabs.retain(|tab| tab.id != id);
                if next.active_tab_id.as_deref() == Some(id.as_str()) {
                    match next.open_tabs.last() {
                        Some(last) => {
                            next.active_tab_id = Some(last.id.clone());
                            next.active_page = ActivePage::Notebook;
                        }
                        None => {
                            next.active_tab_id = None;
                            next.active_page = ActivePage::Home;
                        }
                    }
                }
            }
            UiEvent::SetActiveTab(id) => {
                next.active_tab_id = Some(id);
                next.active_page = ActivePage::Notebook;
            }
            UiEvent::OpenSparkCanvas => next.spark_canvas_visible = true,
            UiEvent::CloseSparkCanvas => next.spark_canvas_visible = false,
            UiEvent::SelectSpark(root_id) => next.selected_spark_root_id = root_id,
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivePage, UiEvent, UiState};

    fn open(state: UiState, id: &str, label: &str) -> UiState {
        state.apply(UiEvent::OpenNotebookTab {
            id: id.to_string(),
            label: label.to_string(),
        })
    }

    #[test]
    fn opening_an_already_open_tab_only_activates_it() {
        let state = open(open(UiState::default(), "a", "A"), "b", "B");
        let state = open(state, "a", "A");
        assert_eq!(state.open_tabs.len(), 2);
        assert_eq!(state.active_tab_id.as_deref(), Some("a"));
        assert_eq!(state.active_page, ActivePage::Notebook);
    }

    #[test]
    fn closing_the_active_tab_falls_back_to_the_last_remaining_tab() {
        let state = open(open(UiState::default(), "a", "A"), "b", "B");
        let state = state.apply(UiEvent::CloseTab("b".to_string()));
        assert_eq!(state.active_tab_id.as_deref(), Some("a"));
        assert_eq!(state.active_page, ActivePage::Notebook);
    }

    #[test]
    fn closing_the_last_tab_returns_home() {
        let state = open(UiState::default(), "a", "A");
        let state = state.apply(UiEvent::CloseTab("a".to_string()));
        assert!(state.open_tabs.is_empty());
        assert!(state.active_tab_id.is_none());
        assert_eq!(state.active_page, ActivePage::Home);
    }

    #[test]
    fn closing_an_inactive_tab_keeps_the_active_one() {
        let state = open(open(UiState::default(), "a", "A"), "b", "B");
        let state = state.apply(UiEvent::CloseTab("a".to_string()));
        assert_eq!(state.active_tab_id.as_deref(), Some("b"));
        assert_eq!(state.open_tabs.len(), 1);
    }

    #[test]
    fn navigating_off_the_notebook_page_clears_the_active_tab() {
        let state = open(UiState::default(), "a", "A");
        let state = state.apply(UiEvent::NavigateTo(ActivePage::Inbox));
        assert_eq!(state.active_page, ActivePage::Inbox);
        assert!(state.active_tab_id.is_none());
        // tabs stay open for when the user returns
        assert_eq!(state.open_tabs.len(), 1);
    }

    #[test]
    fn spark_canvas_and_selection_toggle_independently() {
        let state = UiState::default()
            .apply(UiEvent::OpenSparkCanvas)
            .apply(UiEvent::SelectSpark(Some("root-1".to_string())));
        assert!(state.spark_canvas_visible);
        assert_eq!(state.selected_spark_root_id.as_deref(), Some("root-1"));

        let state = state.apply(UiEvent::CloseSparkCanvas);
        assert!(!state.spark_canvas_visible);
        assert_eq!(state.selected_spark_root_id.as_deref(), Some("root-1"));
    }
}
