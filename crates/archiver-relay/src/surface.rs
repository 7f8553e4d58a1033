//! UI binding layer contract.
//!
//! A [`Surface`] renders one input per discovered media element. The client
//! session drives it; it never reads state back.

use archiver_core::{FileRecord, InputView};

pub trait Surface: Send {
    /// A record was discovered; create its input.
    fn bind(&mut self, record: &FileRecord, view: &InputView);

    /// Re-render an existing input.
    fn update(&mut self, hash: &str, view: &InputView);

    /// Show `suggestion` as ghost text under the input. Empty clears it.
    fn suggest(&mut self, hash: &str, suggestion: &str);

    /// Replace the input's text, as tab-completion does.
    fn fill(&mut self, hash: &str, text: &str);

    fn focus(&mut self, hash: &str);
}
