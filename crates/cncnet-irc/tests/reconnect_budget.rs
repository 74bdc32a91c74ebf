use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use cncnet_irc::{
    ConnectionSettings, ConnectionState, IrcConnection, IrcEvent, LatencyProbe, ReconnectConfig,
    Server,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

struct InstantProbe;

impl LatencyProbe for InstantProbe {
    fn probe(
        &self,
        _addr: SocketAddr,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Option<Duration>> + Send + '_>> {
        Box::pin(async { Some(Duration::from_millis(1)) })
    }
}

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        nick: "tester".to_string(),
        send_sleep: Duration::from_millis(5),
        connect_timeout: Duration::from_millis(500),
        reconnect: ReconnectConfig {
            delay: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<IrcEvent>) -> IrcEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn test_nine_lost_connections_exhaust_the_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let servers = vec![Server::new("127.0.0.1", "Flaky", vec![port])];
    let (conn, mut events) = IrcConnection::new(settings(), servers, Arc::new(InstantProbe));
    conn.connect();

    let mut lost = 0;
    let mut attempts = Vec::new();
    loop {
        match next_event(&mut events).await {
            IrcEvent::ConnectionLost { .. } => lost += 1,
            IrcEvent::ReconnectAttempt { attempt } => attempts.push(attempt),
            IrcEvent::ReconnectBudgetExhausted => break,
            _ => {}
        }
    }

    assert_eq!(lost, 9);
    assert_eq!(attempts, (1..=8).collect::<Vec<_>>());
    assert_eq!(conn.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, IrcEvent::ReconnectAttempt { .. }),
            "no reconnect after exhaustion"
        );
    }
}

#[tokio::test]
async fn test_user_disconnect_sends_quit_and_never_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (quit_tx, quit_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        write
            .write_all(b":srv 001 tester :Welcome\r\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.starts_with("QUIT") {
                let _ = quit_tx.send(line);
                break;
            }
        }
    });

    let servers = vec![Server::new("127.0.0.1", "Local", vec![port])];
    let (conn, mut events) = IrcConnection::new(settings(), servers, Arc::new(InstantProbe));
    conn.connect();

    loop {
        if let IrcEvent::Welcome { .. } = next_event(&mut events).await {
            break;
        }
    }

    conn.disconnect();
    assert_eq!(next_event(&mut events).await, IrcEvent::Disconnected);

    let quit = tokio::time::timeout(Duration::from_secs(5), quit_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quit, "QUIT");

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(
                event,
                IrcEvent::ReconnectAttempt { .. } | IrcEvent::ConnectionLost { .. }
            ),
            "unexpected {event:?}"
        );
    }
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_channel_traffic_becomes_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b":srv 001 tester :Welcome\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            if line == "JOIN #cncnet-game" {
                write
                    .write_all(
                        b":tester!cncnet@10.0.0.1 JOIN #cncnet-game\r\n\
                          :Alice!a@10.0.0.2 PRIVMSG #cncnet-game :hi there\r\n\
                          :Alice!a@10.0.0.2 NOTICE #cncnet-game :\x01READY 1\x01\r\n",
                    )
                    .await
                    .unwrap();
            }
        }
    });

    let servers = vec![Server::new("127.0.0.1", "Local", vec![port])];
    let (conn, mut events) = IrcConnection::new(settings(), servers, Arc::new(InstantProbe));
    conn.connect();

    loop {
        if let IrcEvent::Welcome { .. } = next_event(&mut events).await {
            break;
        }
    }
    conn.join_channel("#cncnet-game", None);

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match next_event(&mut events).await {
            e @ (IrcEvent::UserJoinedChannel { .. }
            | IrcEvent::ChatMessage { .. }
            | IrcEvent::Ctcp { .. }) => seen.push(e),
            _ => {}
        }
    }

    assert!(matches!(&seen[0], IrcEvent::UserJoinedChannel { nick, .. } if nick == "tester"));
    assert!(matches!(&seen[1], IrcEvent::ChatMessage { message, .. } if message == "hi there"));
    assert_eq!(
        seen[2],
        IrcEvent::Ctcp {
            sender: "Alice".to_string(),
            target: "#cncnet-game".to_string(),
            payload: "READY 1".to_string(),
        }
    );
    conn.disconnect();
}
