use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Upload,
    Search,
    Results,
}

impl View {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upload" => Some(View::Upload),
            "search" => Some(View::Search),
            "results" => Some(View::Results),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// User picked a tab.
    Select(View),
    OperationStarted,
    OperationFinished,
    /// A search call returned a result.
    SearchSucceeded,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkflowState {
    pub view: View,
    pub busy: bool,
    pub has_result: bool,
}

impl WorkflowState {
    pub fn can_select(&self, view: View) -> bool {
        view != View::Results || self.has_result
    }

    /// Disallowed events leave the state unchanged.
    pub fn apply(self, event: Event) -> WorkflowState {
        match event {
            Event::Select(view) if self.can_select(view) => WorkflowState { view, ..self },
            Event::Select(_) => self,
            Event::OperationStarted => WorkflowState { busy: true, ..self },
            Event::OperationFinished => WorkflowState { busy: false, ..self },
            Event::SearchSucceeded => WorkflowState {
                view: View::Results,
                has_result: true,
                ..self
            },
        }
    }
}
