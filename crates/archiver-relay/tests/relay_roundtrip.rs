//! End-to-end: client sessions over the real Unix-socket relay, against an
//! in-memory agent that keeps its archive in a map.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiver_agent::{AgentConnection, AgentConnector, AgentError};
use archiver_core::config::Configuration;
use archiver_core::{AgentReply, AgentRequest, FileRecord, InputView, MediaElement, RecordState};
use archiver_relay::config_store::write_config;
use archiver_relay::{
    ClientSession, ConfigStore, ConnectionManager, ManagerHandle, RelayServer, Surface,
    UnixConnector,
};
use tokio_util::sync::CancellationToken;

type Archive = Arc<Mutex<HashMap<String, String>>>;

/// Answers like the native host: names for hashes, `{hash: name}` for a set.
struct MapAgent {
    archive: Archive,
}

impl AgentConnector for MapAgent {
    fn connect(&self) -> Result<AgentConnection, AgentError> {
        let (connection, mut peer) = AgentConnection::in_memory();
        let archive = Arc::clone(&self.archive);
        tokio::spawn(async move {
            while let Some(request) = peer.requests.recv().await {
                let reply = answer(&archive, request);
                if peer.replies.send(reply).is_err() {
                    break;
                }
            }
        });
        Ok(connection)
    }
}

fn answer(archive: &Archive, request: AgentRequest) -> AgentReply {
    let Ok(mut archive) = archive.lock() else {
        return AgentReply::Failure {
            error: "archive poisoned".into(),
        };
    };
    let names: BTreeMap<String, Option<String>> = match request {
        AgentRequest::Get { hashes, .. } if hashes.is_empty() => archive
            .iter()
            .map(|(h, n)| (h.clone(), Some(n.clone())))
            .collect(),
        AgentRequest::Get { hashes, .. } => hashes
            .into_iter()
            .map(|h| {
                let name = archive.get(&h).cloned();
                (h, name)
            })
            .collect(),
        AgentRequest::Set { hash, name, .. } => {
            archive.insert(hash.clone(), name.clone());
            BTreeMap::from([(hash, Some(name))])
        }
        AgentRequest::Pick(()) => {
            return AgentReply::Message {
                msg: serde_json::json!("/picked"),
            };
        }
    };
    AgentReply::Message {
        msg: serde_json::to_value(names).unwrap(),
    }
}

#[derive(Default)]
struct Recorder {
    views: HashMap<String, InputView>,
    focused: Vec<String>,
}

impl Surface for Recorder {
    fn bind(&mut self, record: &FileRecord, view: &InputView) {
        self.views.insert(record.hash.clone(), view.clone());
    }
    fn update(&mut self, hash: &str, view: &InputView) {
        self.views.insert(hash.to_string(), view.clone());
    }
    fn suggest(&mut self, _hash: &str, _suggestion: &str) {}
    fn fill(&mut self, _hash: &str, _text: &str) {}
    fn focus(&mut self, hash: &str) {
        self.focused.push(hash.to_string());
    }
}

type Session = ClientSession<UnixConnector, Recorder>;

struct Relay {
    socket: PathBuf,
    handle: ManagerHandle,
    store: Arc<ConfigStore>,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

async fn start_relay(directory: Option<&str>, archive: Archive) -> Relay {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    write_config(
        &config_path,
        &Configuration {
            directory: directory.map(str::to_string),
            prefer_original_filename: true,
        },
    )
    .unwrap();
    let store = Arc::new(ConfigStore::load(&config_path).unwrap());

    let cancel = CancellationToken::new();
    let (manager, handle) =
        ConnectionManager::with_cancel(MapAgent { archive }, Arc::clone(&store), cancel.clone());
    tokio::spawn(manager.run());

    let socket = dir.path().join("run/relay.sock");
    tokio::spawn(RelayServer::with_cancel(&socket, handle.clone(), cancel.clone()).run());
    wait_for(&socket).await;

    Relay {
        socket,
        handle,
        store,
        cancel,
        _dir: dir,
    }
}

async fn wait_for(socket: &Path) {
    for _ in 0..200 {
        if socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("relay socket never appeared at {}", socket.display());
}

fn element(hash: &str) -> MediaElement {
    MediaElement {
        hash: Some(hash.to_string()),
        original_filename: Some(format!("{hash}-original.jpg")),
        filename: Some(format!("{hash}.jpg")),
        url: Some(format!("https://img.example/{hash}.jpg")),
    }
}

async fn pump_until(session: &mut Session, done: impl Fn(&Session) -> bool) {
    for _ in 0..50 {
        if done(session) {
            return;
        }
        let pumped = tokio::time::timeout(Duration::from_secs(2), session.pump())
            .await
            .expect("relay went quiet");
        assert!(pumped, "session has no link");
    }
    panic!("condition never reached");
}

fn state(session: &Session, hash: &str) -> RecordState {
    session.records().get(hash).unwrap().state.clone()
}

#[tokio::test]
async fn names_flow_from_agent_to_inputs_and_back() {
    let archive: Archive = Arc::new(Mutex::new(HashMap::from([(
        "abc123".to_string(),
        "vacation.png".to_string(),
    )])));
    let relay = start_relay(Some("/srv/archive"), Arc::clone(&archive)).await;

    let mut session = Session::new(UnixConnector::new(&relay.socket), Recorder::default());
    session
        .discover(vec![element("abc123"), element("def456"), element("ghi789")])
        .await;
    pump_until(&mut session, |s| s.records().loading_hashes().is_empty()).await;

    assert_eq!(state(&session, "abc123"), RecordState::Named("vacation.png".into()));
    assert_eq!(state(&session, "def456"), RecordState::Unnamed);
    assert!(session.surface().views["abc123"].disabled);
    assert!(!session.surface().views["def456"].disabled);

    session.submit("def456", "beach").await;
    assert_eq!(session.surface().focused, vec!["ghi789"]);
    pump_until(&mut session, |s| {
        state(s, "def456") == RecordState::Named("beach".into())
    })
    .await;
    assert_eq!(
        archive.lock().unwrap().get("def456").map(String::as_str),
        Some("beach")
    );
    assert!(session.suggestions().contains("beach"));

    relay.cancel.cancel();
}

#[tokio::test]
async fn later_sessions_receive_known_suggestions() {
    let archive: Archive = Arc::new(Mutex::new(HashMap::from([(
        "abc123".to_string(),
        "vacation.png".to_string(),
    )])));
    let relay = start_relay(Some("/srv/archive"), archive).await;

    let mut first = Session::new(UnixConnector::new(&relay.socket), Recorder::default());
    first.discover(vec![element("abc123")]).await;
    pump_until(&mut first, |s| s.records().loading_hashes().is_empty()).await;

    let mut second = Session::new(UnixConnector::new(&relay.socket), Recorder::default());
    assert!(second.connect().await);
    pump_until(&mut second, |s| s.suggestions().contains("vacation.png")).await;

    let status = relay.handle.status().await.unwrap();
    assert_eq!(status.sessions, 2);
    assert!(status.agent_open);

    drop(first);
    drop(second);
    let mut status = relay.handle.status().await.unwrap();
    for _ in 0..100 {
        if status.sessions == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = relay.handle.status().await.unwrap();
    }
    assert_eq!(status.sessions, 0);
    assert!(!status.agent_open);

    relay.cancel.cancel();
}

#[tokio::test]
async fn directory_toggle_disables_then_reloads() {
    let archive: Archive = Arc::new(Mutex::new(HashMap::new()));
    let relay = start_relay(None, Arc::clone(&archive)).await;

    let mut session = Session::new(UnixConnector::new(&relay.socket), Recorder::default());
    session.discover(vec![element("a"), element("b")]).await;
    pump_until(&mut session, |s| {
        s.records()
            .iter()
            .all(|r| matches!(r.state, RecordState::Unavailable(_)))
    })
    .await;
    assert_eq!(
        session.surface().views["a"].placeholder,
        "No directory set"
    );

    archive
        .lock()
        .unwrap()
        .insert("a".to_string(), "cats".to_string());
    relay
        .store
        .update(&archiver_core::ConfigUpdate {
            directory: Some("/srv/archive".into()),
            prefer_original_filename: None,
        })
        .unwrap();

    pump_until(&mut session, |s| {
        state(s, "a") == RecordState::Named("cats".into()) && state(s, "b") == RecordState::Unnamed
    })
    .await;

    relay.cancel.cancel();
}
