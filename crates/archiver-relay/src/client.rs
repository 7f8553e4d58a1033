//! Client session: one per UI context.
//!
//! Owns the document's [`RecordTable`] and [`SuggestionSet`], keeps at most
//! one connection to the relay, and drives a [`Surface`].
//!
//! Link state cycles `Disconnected → Connecting → Connected → Disconnected`
//! with no terminal failure. Every request carries a correlation id and
//! stays in the pending table until the relay answers it; whenever a link
//! comes up the pending table is replayed in id order. A dropped link is
//! re-established at once if anything is pending, otherwise on the next
//! outbound request.

use std::collections::BTreeMap;

use serde::Deserialize;
use tokio::sync::mpsc;

use archiver_core::discovery::extract_batch;
use archiver_core::record::SubmitRejected;
use archiver_core::view::{suggestion_for, tab_completion};
use archiver_core::{
    ClientEnvelope, ClientRequest, Configuration, InputView, MediaElement, NameMap, RecordState,
    RecordTable, RelayBody, RelayEnvelope, RelayFailure, SuggestionSet,
};

use crate::surface::Surface;
use crate::transport::{RelayConnection, RelayConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Input from the document: discovery batches and keyboard/focus events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    /// Initial scan or a later mutation; both feed the same pipeline.
    Discovered { elements: Vec<MediaElement> },
    KeyUp { hash: String, text: String },
    Tab { hash: String, text: String },
    Submit { hash: String, name: String },
    Blur { hash: String },
}

pub struct ClientSession<C, S> {
    connector: C,
    surface: S,
    link: Option<RelayConnection>,
    state: LinkState,
    records: RecordTable,
    suggestions: SuggestionSet,
    config: Configuration,
    /// Directory the current record states were resolved against.
    epoch: Option<String>,
    pending: BTreeMap<u64, ClientRequest>,
    next_id: u64,
}

impl<C: RelayConnector, S: Surface> ClientSession<C, S> {
    pub fn new(connector: C, surface: S) -> Self {
        Self {
            connector,
            surface,
            link: None,
            state: LinkState::Disconnected,
            records: RecordTable::new(),
            suggestions: SuggestionSet::new(),
            config: Configuration::default(),
            epoch: None,
            pending: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    pub fn suggestions(&self) -> &SuggestionSet {
        &self.suggestions
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------------
    // Link management
    // -----------------------------------------------------------------------

    /// Establish a fresh link, superseding any existing one, and replay
    /// everything pending. Returns whether the link is up.
    pub async fn connect(&mut self) -> bool {
        self.link = None;
        self.state = LinkState::Connecting;
        match self.connector.connect().await {
            Ok(link) => {
                self.link = Some(link);
                self.state = LinkState::Connected;
                tracing::info!(pending = self.pending.len(), "connected to relay");
                self.replay()
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                tracing::warn!(error = %e, "relay connection failed");
                false
            }
        }
    }

    fn replay(&mut self) -> bool {
        let envelopes: Vec<ClientEnvelope> = self
            .pending
            .iter()
            .map(|(id, request)| ClientEnvelope {
                id: *id,
                request: request.clone(),
            })
            .collect();
        for envelope in envelopes {
            let sent = self
                .link
                .as_ref()
                .is_some_and(|link| link.send(envelope).is_ok());
            if !sent {
                self.lose_link("replay failed");
                return false;
            }
        }
        true
    }

    fn lose_link(&mut self, reason: &'static str) {
        if self.link.take().is_some() {
            tracing::debug!(reason, "relay link dropped");
        }
        self.state = LinkState::Disconnected;
    }

    /// The relay went away. Reconnect now only if answers are owed.
    pub async fn handle_disconnect(&mut self) {
        self.lose_link("relay closed");
        tracing::warn!(pending = self.pending.len(), "disconnected from relay");
        if !self.pending.is_empty() {
            self.connect().await;
        }
    }

    async fn request(&mut self, request: ClientRequest) {
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(id, kind = request.kind(), "request queued");
        self.pending.insert(id, request.clone());

        if let Some(link) = &self.link {
            if link.send(ClientEnvelope { id, request }).is_ok() {
                return;
            }
            self.lose_link("send failed");
        }
        // Replays the request just queued along with anything older.
        self.connect().await;
    }

    // -----------------------------------------------------------------------
    // Document side
    // -----------------------------------------------------------------------

    /// Feed a discovery batch. New records are bound in `Loading` and looked
    /// up with a single `get`; incomplete elements are skipped.
    pub async fn discover(&mut self, elements: Vec<MediaElement>) {
        let (found, skipped) = extract_batch(elements);
        for (element, missing) in &skipped {
            tracing::debug!(%missing, hash = ?element.hash, "media element skipped");
        }

        let added = self.records.discover(found);
        for hash in &added {
            if let Some(record) = self.records.get(hash) {
                self.surface.bind(record, &InputView::of(record));
            }
        }
        if added.is_empty() {
            return;
        }
        tracing::debug!(count = added.len(), "media discovered");
        self.request(ClientRequest::Get { hashes: added }).await;
    }

    /// User confirmed a name. Empty input does nothing; otherwise the input
    /// locks, focus moves on and a single `set` goes out.
    pub async fn submit(&mut self, hash: &str, name: &str) {
        let request = match self.records.begin_submit(hash, name) {
            Ok(record) => ClientRequest::Set {
                hash: record.hash.clone(),
                name: name.to_string(),
                filename: self
                    .config
                    .choose_filename(&record.original_filename, &record.current_filename)
                    .to_string(),
                url: record.source_url.clone(),
            },
            Err(SubmitRejected::EmptyName) => return,
            Err(rejected) => {
                tracing::debug!(hash, ?rejected, "submission ignored");
                return;
            }
        };

        self.render(&[hash.to_string()]);
        self.surface.suggest(hash, "");
        if let Some(next) = self.records.next_editable_after(hash) {
            let next = next.hash.clone();
            self.surface.focus(&next);
        }
        self.request(request).await;
    }

    pub fn key_up(&mut self, hash: &str, text: &str) {
        let suggestion = suggestion_for(&self.suggestions, text);
        self.surface.suggest(hash, suggestion);
    }

    pub fn tab(&mut self, hash: &str, text: &str) {
        let suggestion = suggestion_for(&self.suggestions, text);
        if let Some(completed) = tab_completion(suggestion, text) {
            self.surface.fill(hash, completed);
        }
    }

    pub fn blur(&mut self, hash: &str) {
        self.surface.suggest(hash, "");
    }

    pub async fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Discovered { elements } => self.discover(elements).await,
            UiEvent::KeyUp { hash, text } => self.key_up(&hash, &text),
            UiEvent::Tab { hash, text } => self.tab(&hash, &text),
            UiEvent::Submit { hash, name } => self.submit(&hash, &name).await,
            UiEvent::Blur { hash } => self.blur(&hash),
        }
    }

    // -----------------------------------------------------------------------
    // Relay side
    // -----------------------------------------------------------------------

    pub async fn handle_message(&mut self, message: RelayEnvelope) {
        let origin = message.id.and_then(|id| self.pending.remove(&id));
        if message.id.is_some() && origin.is_none() {
            tracing::debug!(id = ?message.id, "reply to unknown request ignored");
            return;
        }

        match message.body {
            RelayBody::Get { msg } => self.apply_names(&msg, origin.as_ref()),
            RelayBody::Suggestions { msg } => {
                self.suggestions.record(msg);
            }
            RelayBody::Config { msg } => self.apply_config(msg).await,
            RelayBody::Error(failure) => self.apply_failure(failure, origin),
        }
    }

    fn apply_names(&mut self, names: &NameMap, origin: Option<&ClientRequest>) {
        let applied = self.records.apply_names(names);
        self.suggestions.record(&applied.confirmed);
        self.render(&applied.changed);

        // An acknowledgement that does not name the submitted hash leaves
        // nothing to wait for.
        if let Some(ClientRequest::Set { hash, .. }) = origin {
            let still_pending = self.records.get(hash).is_some_and(|r| r.pending.is_some());
            if still_pending && self.records.fail_submit(hash) {
                tracing::warn!(hash, "set acknowledged without a name, input re-enabled");
                self.render(std::slice::from_ref(hash));
            }
        }
    }

    async fn apply_config(&mut self, config: Configuration) {
        self.config = config;
        let Some(directory) = self.config.directory().map(str::to_string) else {
            self.epoch = None;
            self.forget_lookups();
            let changed = self.records.mark_all_unavailable(RelayFailure::NO_DIRECTORY);
            self.render(&changed);
            return;
        };
        if self.epoch.as_deref() == Some(directory.as_str()) {
            let retried = self.records.retry_unavailable(RelayFailure::AGENT_UNAVAILABLE);
            if !retried.is_empty() {
                tracing::info!(records = retried.len(), "retrying lookups that found no agent");
                self.render(&retried);
                self.request(ClientRequest::Get { hashes: retried }).await;
            }
            return;
        }

        let previous = self.epoch.replace(directory);
        let stale = previous.is_some()
            || self
                .records
                .iter()
                .any(|r| matches!(r.state, RecordState::Unavailable(_)));
        if !stale || self.records.is_empty() {
            return;
        }

        tracing::info!(records = self.records.len(), "archive directory changed, reloading names");
        self.forget_lookups();
        let hashes = self.records.reset_all_loading();
        self.render(&hashes);
        self.request(ClientRequest::Get { hashes }).await;
    }

    /// Drop pending lookups so answers from a previous directory are
    /// ignored when they arrive.
    fn forget_lookups(&mut self) {
        self.pending
            .retain(|_, request| !matches!(request, ClientRequest::Get { .. }));
    }

    fn apply_failure(&mut self, failure: RelayFailure, origin: Option<ClientRequest>) {
        if failure.is_no_directory() {
            self.epoch = None;
            let changed = self.records.mark_all_unavailable(&failure.error);
            self.render(&changed);
            return;
        }

        match origin {
            Some(ClientRequest::Set { hash, .. }) => {
                tracing::warn!(%hash, %failure, "set failed");
                if self.records.fail_submit(&hash) {
                    self.render(&[hash]);
                }
            }
            Some(ClientRequest::Get { hashes }) if failure.is_agent_unavailable() => {
                tracing::warn!(%failure, "lookup failed");
                let changed = self.records.mark_unavailable(&hashes, &failure.error);
                self.render(&changed);
            }
            Some(request) => tracing::warn!(kind = request.kind(), %failure, "request failed"),
            None => tracing::warn!(%failure, "relay error"),
        }
    }

    fn render(&mut self, hashes: &[String]) {
        for hash in hashes {
            if let Some(record) = self.records.get(hash) {
                self.surface.update(hash, &InputView::of(record));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Wait for one relay message (or the link dropping) and handle it.
    /// Returns false when there is no link to wait on.
    pub async fn pump(&mut self) -> bool {
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.recv().await {
            Some(message) => self.handle_message(message).await,
            None => self.handle_disconnect().await,
        }
        true
    }

    /// Run until the event stream ends, then hand the session back.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<UiEvent>) -> Self {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                message = next_message(&mut self.link) => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => self.handle_disconnect().await,
                    }
                }
            }
        }
        self
    }
}

async fn next_message(link: &mut Option<RelayConnection>) -> Option<RelayEnvelope> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

// ─── Tests ────────────────────────────────────────────────────────
