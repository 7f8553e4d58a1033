//! Input view rules: what a bound input shows for a record, and the
//! keyboard affordances around it.

use serde::Serialize;

use crate::record::{FileRecord, RecordState};
use crate::suggestion::SuggestionSet;

pub const LOADING_PLACEHOLDER: &str = "Loading...";

/// Rendered state of one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputView {
    pub value: String,
    pub disabled: bool,
    pub placeholder: String,
}

impl InputView {
    pub fn of(record: &FileRecord) -> Self {
        match (&record.state, &record.pending) {
            (RecordState::Loading, _) => Self {
                value: String::new(),
                disabled: true,
                placeholder: LOADING_PLACEHOLDER.to_string(),
            },
            (RecordState::Named(name), _) => Self {
                value: name.clone(),
                disabled: true,
                placeholder: String::new(),
            },
            (RecordState::Unnamed, Some(pending)) => Self {
                value: pending.clone(),
                disabled: true,
                placeholder: String::new(),
            },
            (RecordState::Unnamed, None) => Self {
                value: String::new(),
                disabled: false,
                placeholder: String::new(),
            },
            (RecordState::Unavailable(reason), _) => Self {
                value: String::new(),
                disabled: true,
                placeholder: reason.clone(),
            },
        }
    }
}

/// Ghost text shown under the input while typing.
pub fn suggestion_for<'a>(suggestions: &'a SuggestionSet, typed: &str) -> &'a str {
    suggestions.query(typed)
}

/// Text that tab should complete to, if the suggestion adds anything.
pub fn tab_completion<'a>(suggestion: &'a str, typed: &str) -> Option<&'a str> {
    (!suggestion.is_empty() && suggestion != typed).then_some(suggestion)
}
