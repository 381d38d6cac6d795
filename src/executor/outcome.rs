use serde::Serialize;

/// What was observed after a control was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// The control left the page.
    Detached,
    Disabled,
    /// `aria-expanded="true"`
    Expanded,
    LabelChanged,
    /// A new post container appeared in the watched scope.
    PostInserted,
    /// A new inline show-more marker appeared in the watched scope.
    MarkerInserted,
}

impl Evidence {
    /// Whether this came from the mutation subscription rather than polling.
    pub fn is_structural(self) -> bool {
        matches!(self, Evidence::PostInserted | Evidence::MarkerInserted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "evidence", rename_all = "snake_case")]
pub enum ExpandOutcome {
    Confirmed(Evidence),
    /// Triggered, but no effect was observed before the checks ran out.
    Unverified,
    /// Could not be brought into view; nothing was triggered.
    NotInView,
}

impl ExpandOutcome {
    pub fn is_success(self, count_unverified: bool) -> bool {
        match self {
            ExpandOutcome::Confirmed(_) => true,
            ExpandOutcome::Unverified => count_unverified,
            ExpandOutcome::NotInView => false,
        }
    }
}
