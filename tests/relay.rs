//! End-to-end relay scenarios over real WebSocket connections

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use group_relay::{serve, AppError, ClientId, GroupId, Reconciler, Session};

const WAIT: Duration = Duration::from_secs(20);

struct TestServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), AppError>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(listener, 64, async {
            let _ = rx.await;
        }));
        Self {
            url,
            shutdown: Some(tx),
            task,
        }
    }

    async fn connect(&self) -> Session {
        Session::connect(&self.url, ()).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(WAIT, self.task).await.unwrap().unwrap().unwrap();
    }
}

async fn eventually(session: &Session, what: &str, check: impl Fn(&Reconciler) -> bool) {
    let waited = timeout(WAIT, async {
        while !session.with_state(&check).await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "client {}: timed out waiting for {}", session.client_id(), what);
}

fn ids(raw: &[u64]) -> Vec<ClientId> {
    raw.iter().map(|id| ClientId(*id)).collect()
}

#[tokio::test]
async fn test_concurrent_connections_get_distinct_ids() {
    let server = TestServer::start().await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let url = server.url.clone();
            tokio::spawn(async move { Session::connect(&url, ()).await.unwrap() })
        })
        .collect();

    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap());
    }
    let mut assigned: Vec<u64> = sessions.iter().map(|s| s.client_id().0).collect();
    assigned.sort_unstable();
    assert_eq!(assigned, (0..8).collect::<Vec<_>>());

    server.stop().await;
}

#[tokio::test]
async fn test_team_group_and_first_message() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;
    assert_eq!((a.client_id(), b.client_id()), (ClientId(0), ClientId(1)));

    a.request_create_group("Team", [ClientId(1)]).unwrap();
    for s in [&a, &b] {
        eventually(s, "group Team", |r| r.groups().len() == 1).await;
        let groups = s.groups().await;
        assert_eq!(groups[0].id, GroupId(0));
        assert_eq!(groups[0].name, "Team");
        assert_eq!(groups[0].members, ids(&[0, 1]));
    }

    a.send_message(GroupId(0), "hi", Vec::new()).unwrap();
    for s in [&a, &b] {
        eventually(s, "message hi", |r| {
            r.group(GroupId(0)).is_some_and(|g| g.messages.len() == 1)
        })
        .await;
        let group = s.groups().await.remove(0);
        assert_eq!(group.messages[0].sender, ClientId(0));
        assert_eq!(group.messages[0].text, "hi");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_group_ids_increase() {
    let server = TestServer::start().await;
    let a = server.connect().await;

    for name in ["one", "two", "three"] {
        a.request_create_group(name, []).unwrap();
    }
    eventually(&a, "three groups", |r| r.groups().len() == 3).await;

    let groups = a.groups().await;
    let got: Vec<(i64, &str)> = groups.iter().map(|g| (g.id.0, g.name.as_str())).collect();
    assert_eq!(got, vec![(0, "one"), (1, "two"), (2, "three")]);

    server.stop().await;
}

#[tokio::test]
async fn test_removed_member_drops_replica() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;
    let c = server.connect().await;
    assert_eq!(c.client_id(), ClientId(2));

    a.request_create_group("Trio", [ClientId(1), ClientId(2)]).unwrap();
    eventually(&c, "joined Trio", |r| r.group(GroupId(0)).is_some()).await;
    eventually(&a, "joined Trio", |r| r.group(GroupId(0)).is_some()).await;

    a.send_message(GroupId(0), "before", Vec::new()).unwrap();
    eventually(&a, "history", |r| r.group(GroupId(0)).is_some_and(|g| !g.messages.is_empty())).await;

    a.request_edit_group(GroupId(0), "Duo", [ClientId(0), ClientId(1)])
        .await
        .unwrap();
    eventually(&c, "left Trio", |r| r.group(GroupId(0)).is_none()).await;
    eventually(&b, "renamed", |r| {
        r.group(GroupId(0)).is_some_and(|g| g.name == "Duo")
    })
    .await;

    let kept = b.groups().await.remove(0);
    assert_eq!(kept.members, ids(&[0, 1]));
    assert_eq!(kept.messages.len(), 1, "history survives an edit");

    assert!(matches!(
        c.request_edit_group(GroupId(0), "x", []).await,
        Err(AppError::UnknownGroup(GroupId(0)))
    ));

    server.stop().await;
}

#[tokio::test]
async fn test_deregistration_broadcast_and_close() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;
    let c = server.connect().await;

    for s in [&a, &b, &c] {
        s.request_register().unwrap();
        eventually(s, "own registration", |r| r.is_registered()).await;
    }
    for s in [&a, &b, &c] {
        eventually(s, "all registered", |r| r.registered_users().len() == 3).await;
    }

    b.request_deregister().await.unwrap();
    for s in [&a, &c] {
        eventually(s, "b gone", |r| r.registered_users() == ids(&[0, 2]).as_slice()).await;
    }
    timeout(WAIT, b.closed()).await.expect("deregistered session closed");
    assert!(matches!(
        b.send_message(GroupId(0), "late", Vec::new()),
        Err(AppError::Deregistered)
    ));

    server.stop().await;
}

#[tokio::test]
async fn test_fanout_reaches_every_member_once() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;
    let c = server.connect().await;

    a.request_create_group("All", [ClientId(1), ClientId(2)]).unwrap();
    for s in [&a, &b, &c] {
        eventually(s, "joined All", |r| r.group(GroupId(0)).is_some()).await;
    }

    let blob = vec![0u8, 1, 2, 254, 255];
    c.send_message(GroupId(0), "", vec![blob.clone()]).unwrap();
    for s in [&a, &b, &c] {
        eventually(s, "attachment", |r| {
            r.group(GroupId(0)).is_some_and(|g| g.messages.len() == 1)
        })
        .await;
    }

    sleep(Duration::from_millis(50)).await;
    for s in [&a, &b, &c] {
        let group = s.groups().await.remove(0);
        assert_eq!(group.messages.len(), 1);
        assert_eq!(group.messages[0].sender, ClientId(2));
        assert_eq!(group.messages[0].attachments, vec![blob.clone()]);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_unclean_disconnect_leaves_registration() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;

    a.request_register().unwrap();
    b.request_register().unwrap();
    eventually(&a, "both registered", |r| r.registered_users().len() == 2).await;

    // Dropping the session closes the socket without deregistering
    drop(b);
    sleep(Duration::from_millis(50)).await;

    let c = server.connect().await;
    c.request_register().unwrap();
    eventually(&c, "stale set", |r| r.registered_users() == ids(&[0, 1, 2]).as_slice()).await;

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;

    server.stop().await;

    timeout(WAIT, a.closed()).await.expect("a closed");
    timeout(WAIT, b.closed()).await.expect("b closed");
    assert!(a.is_closed());
}

#[tokio::test]
async fn test_deregister_requires_registration() {
    let server = TestServer::start().await;
    let a = server.connect().await;

    // Not registered yet: nothing is sent and the session stays usable
    assert!(matches!(
        a.request_deregister().await,
        Err(AppError::NotRegistered)
    ));
    a.request_create_group("solo", []).unwrap();
    eventually(&a, "solo group", |r| r.groups().len() == 1).await;

    a.request_register().unwrap();
    eventually(&a, "registered once", |r| r.registered_users() == ids(&[0]).as_slice()).await;

    a.request_deregister().await.unwrap();
    timeout(WAIT, a.closed()).await.expect("deregistered session closed");

    server.stop().await;
}

#[tokio::test]
async fn test_large_attachment_relayed() {
    let server = TestServer::start().await;
    let a = server.connect().await;
    let b = server.connect().await;

    a.request_create_group("Big", [ClientId(1)]).unwrap();
    for s in [&a, &b] {
        eventually(s, "joined Big", |r| r.group(GroupId(0)).is_some()).await;
    }

    // Over 16 MiB once base64-encoded
    let blob: Vec<u8> = (0..13usize << 20).map(|i| (i % 251) as u8).collect();
    a.send_message(GroupId(0), "", vec![blob.clone()]).unwrap();
    for s in [&a, &b] {
        eventually(s, "large attachment", |r| {
            r.group(GroupId(0)).is_some_and(|g| g.messages.len() == 1)
        })
        .await;
    }
    let got = b.groups().await.remove(0);
    assert_eq!(got.messages[0].attachments[0], blob);

    // An edit resends the history, attachment included
    a.request_edit_group(GroupId(0), "Bigger", [ClientId(0), ClientId(1)])
        .await
        .unwrap();
    eventually(&b, "renamed", |r| {
        r.group(GroupId(0)).is_some_and(|g| g.name == "Bigger")
    })
    .await;
    assert!(!a.is_closed());
    assert!(!b.is_closed());

    server.stop().await;
}

#[tokio::test]
async fn test_undecodable_frame_closes_only_that_connection() {
    let server = TestServer::start().await;

    let (mut raw, _) = connect_async(server.url.as_str()).await.unwrap();
    let first = timeout(WAIT, raw.next()).await.unwrap();
    assert!(matches!(first, Some(Ok(Message::Text(_)))));

    raw.send(Message::Text("not json".into())).await.unwrap();
    let ended = timeout(WAIT, async {
        loop {
            match raw.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "bad connection was not closed");

    let a = server.connect().await;
    let b = server.connect().await;
    assert_eq!((a.client_id(), b.client_id()), (ClientId(1), ClientId(2)));

    a.request_create_group("Still", [b.client_id()]).unwrap();
    eventually(&b, "joined Still", |r| r.group(GroupId(0)).is_some()).await;
    a.send_message(GroupId(0), "alive", Vec::new()).unwrap();
    eventually(&b, "message alive", |r| {
        r.group(GroupId(0)).is_some_and(|g| g.messages.len() == 1)
    })
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_sends_close_before_returning() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let url = format!("ws://{}", std_listener.local_addr().unwrap());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    // Own runtime, dropped as soon as serve returns like a real process exit
    let server = std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = TcpListener::from_std(std_listener).unwrap();
            serve(listener, 64, async {
                let _ = stop_rx.await;
            })
            .await
        })
    });

    let (mut raw, _) = connect_async(url.as_str()).await.unwrap();
    let first = timeout(WAIT, raw.next()).await.unwrap();
    assert!(matches!(first, Some(Ok(Message::Text(_)))));

    stop_tx.send(()).unwrap();
    tokio::task::spawn_blocking(move || server.join())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let next = timeout(WAIT, raw.next()).await.unwrap();
    assert!(matches!(next, Some(Ok(Message::Close(_)))));
}
