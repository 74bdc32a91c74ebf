use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cncnet_lan::{ClientSettings, HostSettings, LanClient, LanCodec, LanHost};
use cncnet_loading::{
    Collaborators, DirectorySaveStorage, EngineState, GameLauncher, GameLoadingSyncEngine,
    IniDocument, InMemoryStatistics, LanClientTransport, LanHostTransport, LaunchError,
    LaunchRequest, LauncherEvent, LoadingTransport, LobbyEvent, SessionContext, Sha256FileHasher,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const DESCRIPTOR: &str = "[Settings]\nName=Alice\nColor=0\nGameID=5521\n\n[Other1]\nName=Bob\nColor=3\n";
const INGAME_PORT: u16 = 1234;

#[derive(Clone, Default)]
struct RecordingLauncher(Arc<Mutex<Vec<LaunchRequest>>>);

impl GameLauncher for RecordingLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), LaunchError> {
        self.0.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<LauncherEvent> {
        Vec::new()
    }
}

fn install(dir: &Path, player: &str) -> SessionContext {
    let ctx = SessionContext::in_dir(player, dir);
    std::fs::create_dir_all(&ctx.saved_games_dir).unwrap();
    std::fs::write(&ctx.saved_spawn_path, DESCRIPTOR).unwrap();
    std::fs::write(ctx.saved_games_dir.join("SAVE0001.SAV"), b"save").unwrap();
    ctx
}

fn engine<T: LoadingTransport>(
    ctx: SessionContext,
    transport: T,
    launcher: RecordingLauncher,
) -> GameLoadingSyncEngine<T> {
    let collaborators = Collaborators {
        saves: Box::new(DirectorySaveStorage::new(
            ctx.saved_spawn_path.clone(),
            ctx.saved_games_dir.clone(),
        )),
        launcher: Box::new(launcher),
        hasher: Box::new(Sha256FileHasher),
        statistics: Box::new(InMemoryStatistics::new()),
    };
    let mut engine = GameLoadingSyncEngine::new(ctx, transport, collaborators).unwrap();
    engine.start().unwrap();
    engine
}

fn host_engine(dir: &Path) -> (GameLoadingSyncEngine<LanHostTransport>, SocketAddr, RecordingLauncher) {
    let settings = HostSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let (host, events) = LanHost::start(settings).unwrap();
    let addr = host.local_addr();
    let transport = LanHostTransport::new(host, events, "Alice", INGAME_PORT);
    let launcher = RecordingLauncher::default();
    (engine(install(dir, "Alice"), transport, launcher.clone()), addr, launcher)
}

async fn wait_until(what: &str, mut step: impl FnMut() -> bool) {
    for _ in 0..500 {
        if step() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn assert_silently_dropped<T: LoadingTransport>(
    host: &mut GameLoadingSyncEngine<T>,
    addr: SocketAddr,
    name: &str,
    game_id: &str,
) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&LanCodec::new(0x01, 0x02).join(name, game_id))
        .await
        .unwrap();
    let reader = tokio::spawn(async move {
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.map(|_| received)
    });

    wait_until("the join to be dropped", || {
        host.tick(Instant::now());
        reader.is_finished()
    })
    .await;
    if let Ok(received) = reader.await.unwrap() {
        assert!(received.is_empty(), "rejected peer got {received:?}");
    }
    assert_eq!(host.players().len(), 1);
}

#[tokio::test]
async fn test_invalid_joins_are_closed_without_reply() {
    let dir = tempfile::tempdir().unwrap();
    let (mut host, addr, _launcher) = host_engine(dir.path());

    assert_silently_dropped(&mut host, addr, "Mallory", "5521").await;
    assert_silently_dropped(&mut host, addr, "Bob", "9999").await;
    assert_silently_dropped(&mut host, addr, "Alice", "5521").await;
    assert_eq!(host.state(), EngineState::AwaitingJoin);
}

#[tokio::test]
async fn test_client_joins_readies_and_both_sides_launch() {
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let (mut host, addr, host_launcher) = host_engine(host_dir.path());

    let (client, events) = LanClient::connect(addr, ClientSettings::default(), "Bob", "5521")
        .await
        .unwrap();
    let client_launcher = RecordingLauncher::default();
    let mut bob = engine(
        install(client_dir.path(), "Bob"),
        LanClientTransport::new(client, events, INGAME_PORT),
        client_launcher.clone(),
    );

    wait_until("Bob to see the roster", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        bob.players().len() == 2 && host.players().iter().all(|p| p.verified)
    })
    .await;
    assert_eq!(host.state(), EngineState::Negotiating);

    bob.click_load();
    wait_until("the host to see Bob ready", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        host.state() == EngineState::AllReady
    })
    .await;

    host.click_load();
    assert_eq!(host.state(), EngineState::Loading);
    wait_until("Bob to start loading", || {
        bob.tick(Instant::now());
        bob.state() == EngineState::Loading
    })
    .await;

    let host_spawn = IniDocument::load(&host_dir.path().join("spawn.ini")).unwrap();
    assert_eq!(host_spawn.get("Settings", "SaveGameName"), Some("SAVE0001.SAV"));
    assert_eq!(host_spawn.get("Other1", "Name"), Some("Bob"));
    assert_eq!(host_spawn.get("Other1", "Ip"), Some("127.0.0.1"));

    let bob_spawn = IniDocument::load(&client_dir.path().join("spawn.ini")).unwrap();
    assert_eq!(bob_spawn.get("Settings", "Name"), Some("Bob"));
    assert_eq!(bob_spawn.get("Settings", "Port"), Some("1234"));
    assert_eq!(bob_spawn.get("Other1", "Name"), Some("Alice"));
    assert_eq!(bob_spawn.get("Other1", "Ip"), Some("127.0.0.1"));
    assert_eq!(bob_spawn.get("Other1", "Port"), Some("1234"));

    assert_eq!(host_launcher.0.lock().unwrap().len(), 1);
    assert_eq!(client_launcher.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_client_leaves_when_host_goes_away() {
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let (mut host, addr, _) = host_engine(host_dir.path());

    let (client, events) = LanClient::connect(addr, ClientSettings::default(), "Bob", "5521")
        .await
        .unwrap();
    let mut bob = engine(
        install(client_dir.path(), "Bob"),
        LanClientTransport::new(client, events, INGAME_PORT),
        RecordingLauncher::default(),
    );
    wait_until("Bob to join", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        bob.players().len() == 2
    })
    .await;

    host.leave();
    wait_until("Bob to leave", || {
        bob.tick(Instant::now());
        bob.state() == EngineState::Terminated
    })
    .await;
}

fn chat_lines(events: Vec<LobbyEvent>, sender: &str, text: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LobbyEvent::Chat { sender: s, text: t, .. } if s == sender && t == text))
        .count()
}

#[tokio::test]
async fn test_client_chat_is_shown_once_on_every_side() {
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let (mut host, addr, _) = host_engine(host_dir.path());

    let (client, events) = LanClient::connect(addr, ClientSettings::default(), "Bob", "5521")
        .await
        .unwrap();
    let mut bob = engine(
        install(client_dir.path(), "Bob"),
        LanClientTransport::new(client, events, INGAME_PORT),
        RecordingLauncher::default(),
    );
    wait_until("Bob to join", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        bob.players().len() == 2 && host.players().iter().all(|p| p.verified)
    })
    .await;
    host.drain_events();
    bob.drain_events();

    bob.send_chat("hi there");
    let mut host_seen = 0;
    let mut bob_seen = 0;
    wait_until("the host to show Bob's line", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        host_seen += chat_lines(host.drain_events(), "Bob", "hi there");
        bob_seen += chat_lines(bob.drain_events(), "Bob", "hi there");
        host_seen > 0
    })
    .await;

    // Give a stray relay time to arrive before counting.
    for _ in 0..20 {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        host_seen += chat_lines(host.drain_events(), "Bob", "hi there");
        bob_seen += chat_lines(bob.drain_events(), "Bob", "hi there");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(host_seen, 1);
    assert_eq!(bob_seen, 1);
}

#[tokio::test]
async fn test_kicked_client_session_ends() {
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let (mut host, addr, _) = host_engine(host_dir.path());

    let (client, events) = LanClient::connect(addr, ClientSettings::default(), "Bob", "5521")
        .await
        .unwrap();
    let mut bob = engine(
        install(client_dir.path(), "Bob"),
        LanClientTransport::new(client, events, INGAME_PORT),
        RecordingLauncher::default(),
    );
    wait_until("Bob to join", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        bob.players().len() == 2
    })
    .await;

    host.kick_player("Bob").unwrap();
    assert_eq!(host.players().len(), 1);
    assert_eq!(host.state(), EngineState::AwaitingJoin);
    wait_until("Bob to be dropped", || {
        host.tick(Instant::now());
        bob.tick(Instant::now());
        bob.state() == EngineState::Terminated
    })
    .await;
    assert_eq!(host.players().len(), 1);
}
