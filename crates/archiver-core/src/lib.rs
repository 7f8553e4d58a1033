//! archiver-core: pure domain model for the media archiver.
//! Protocol types, the suggestion engine, the per-document record table,
//! media discovery extraction and input view rules. No IO, no async.

pub mod config;
pub mod discovery;
pub mod protocol;
pub mod record;
pub mod suggestion;
pub mod view;

pub use config::{ConfigUpdate, Configuration};
pub use discovery::{DiscoveredMedia, MediaElement, MissingField};
pub use protocol::{
    AgentReply, AgentRequest, ClientEnvelope, ClientRequest, NameMap, RelayBody, RelayEnvelope,
    RelayFailure,
};
pub use record::{FileRecord, RecordState, RecordTable};
pub use suggestion::SuggestionSet;
pub use view::InputView;
