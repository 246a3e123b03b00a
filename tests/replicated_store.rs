use semisync::analysis::{check_consistency, measure_write_latency};
use semisync::client::RemoteNodeClient;
use semisync::replication::ReplicationEntry;
use semisync::server::Server;
use semisync::{
    Error, Follower, KvsNode, Leader, LocalPeer, Mode, Peer, PutOutcome, Result, SimulatedDelay,
    Timestamp, WriteAck,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A follower that may be unreachable.
#[derive(Clone)]
enum TestPeer {
    Up(LocalPeer),
    Down,
}

impl Peer for TestPeer {
    fn name(&self) -> &str {
        match self {
            TestPeer::Up(peer) => peer.name(),
            TestPeer::Down => "down",
        }
    }

    async fn apply(&self, entry: ReplicationEntry) -> Result<PutOutcome> {
        match self {
            TestPeer::Up(peer) => peer.apply(entry).await,
            TestPeer::Down => Err(Error::Remote("connection refused".to_string())),
        }
    }
}

fn local_followers(latencies_ms: &[u64]) -> (Vec<Follower>, Vec<LocalPeer>) {
    let followers: Vec<Follower> = (0..latencies_ms.len())
        .map(|i| Follower::new(format!("follower{}", i)))
        .collect();
    let peers = followers
        .iter()
        .zip(latencies_ms)
        .enumerate()
        .map(|(i, (f, ms))| {
            LocalPeer::new(f.clone())
                .with_name(format!("follower{}", i))
                .with_latency(Duration::from_millis(*ms))
        })
        .collect();
    (followers, peers)
}

#[tokio::test]
async fn returns_once_quorum_acknowledges() {
    let (followers, peers) = local_followers(&[50, 150, 400]);
    let leader = Leader::new("leader".into(), peers, 2, SimulatedDelay::none());

    let start = Instant::now();
    let ack = leader.write("k".into(), "v".into()).await.unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(
        ack,
        WriteAck::Replicated {
            acks: 2,
            required: 2,
            ..
        }
    ));
    assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);

    // The leader and the two fastest followers already hold the write, the
    // slowest one is still catching up.
    assert_eq!(leader.store().get("k").unwrap().value, "v");
    assert_eq!(followers[0].store().get("k").unwrap().value, "v");
    assert_eq!(followers[1].store().get("k").unwrap().value, "v");
    assert!(followers[2].store().get("k").is_none());
    assert!(leader.in_flight() >= 1);

    leader.drain().await;
    assert_eq!(leader.in_flight(), 0);
    for follower in &followers {
        let record = follower.store().get("k").unwrap();
        assert_eq!(record.value, "v");
        assert_eq!(record.timestamp, ack.timestamp());
    }
}

#[tokio::test]
async fn zero_quorum_does_not_wait() {
    let (followers, peers) = local_followers(&[200, 200]);
    let leader = Leader::new("leader".into(), peers, 0, SimulatedDelay::none());

    let start = Instant::now();
    let ack = leader.write("k".into(), "v".into()).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(matches!(
        ack,
        WriteAck::Replicated {
            acks: 0,
            required: 0,
            ..
        }
    ));
    assert_eq!(leader.store().get("k").unwrap().value, "v");

    leader.drain().await;
    for follower in &followers {
        assert_eq!(follower.store().get("k").unwrap().value, "v");
    }
}

#[tokio::test]
async fn no_followers_writes_locally() {
    let leader: Leader<LocalPeer> = Leader::new("leader".into(), vec![], 3, SimulatedDelay::none());
    let ack = leader.write("k".into(), "v".into()).await.unwrap();
    assert!(matches!(ack, WriteAck::LocalOnly { .. }));
    assert_eq!(leader.store().get("k").unwrap().value, "v");
}

#[tokio::test]
async fn unreachable_followers_fail_the_write() {
    let leader = Leader::new(
        "leader".into(),
        vec![TestPeer::Down, TestPeer::Down],
        1,
        SimulatedDelay::none(),
    );

    let err = leader.write("k".into(), "v".into()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::QuorumNotMet {
            acks: 0,
            required: 1
        }
    ));
    // The local write is not rolled back.
    assert_eq!(leader.store().get("k").unwrap().value, "v");
}

#[tokio::test]
async fn partial_failure_below_quorum() {
    let (followers, peers) = local_followers(&[10]);
    let peers = vec![
        TestPeer::Up(peers[0].clone()),
        TestPeer::Down,
        TestPeer::Down,
    ];
    let leader = Leader::new("leader".into(), peers, 2, SimulatedDelay::none());

    let err = leader.write("k".into(), "v".into()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::QuorumNotMet {
            acks: 1,
            required: 2
        }
    ));
    assert_eq!(followers[0].store().get("k").unwrap().value, "v");

    // The same cluster tolerates the failures with a lower quorum.
    leader.set_quorum(1);
    let ack = leader.write("k".into(), "v2".into()).await.unwrap();
    assert!(matches!(ack, WriteAck::Replicated { acks: 1, .. }));
}

#[tokio::test]
async fn stale_reply_counts_as_acknowledgement() {
    let (followers, peers) = local_followers(&[0]);
    followers[0].apply("k".into(), "future".into(), Timestamp(u64::MAX));
    let leader = Leader::new("leader".into(), peers, 1, SimulatedDelay::none());

    let ack = leader.write("k".into(), "v".into()).await.unwrap();
    assert!(matches!(ack, WriteAck::Replicated { acks: 1, .. }));
    assert_eq!(followers[0].store().get("k").unwrap().value, "future");
}

#[tokio::test]
async fn quorum_is_read_once_per_write() {
    let (_followers, peers) = local_followers(&[20, 100, 300]);
    let leader = Leader::new("leader".into(), peers, 3, SimulatedDelay::none());

    let writer = {
        let leader = leader.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let ack = leader.write("k".into(), "v".into()).await;
            (ack, start.elapsed())
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.set_quorum(1);

    let (ack, elapsed) = writer.await.unwrap();
    assert!(matches!(
        ack.unwrap(),
        WriteAck::Replicated {
            acks: 3,
            required: 3,
            ..
        }
    ));
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);

    // Later writes pick up the new value.
    let ack = leader.write("k".into(), "v2".into()).await.unwrap();
    assert!(matches!(ack, WriteAck::Replicated { required: 1, .. }));
    leader.drain().await;
}

#[tokio::test]
async fn concurrent_writes_converge() {
    let (followers, peers) = local_followers(&[0, 0, 0]);
    let leader = Leader::new(
        "leader".into(),
        peers,
        1,
        SimulatedDelay::new(Duration::from_micros(100), Duration::from_millis(5)),
    );

    let mut handles = Vec::new();
    for i in 0..200 {
        let leader = leader.clone();
        handles.push(tokio::spawn(async move {
            leader
                .write(format!("key{}", i % 5), format!("value{}", i))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    leader.drain().await;

    let expected = leader.store().snapshot();
    assert_eq!(expected.len(), 5);
    for follower in &followers {
        assert_eq!(follower.store().snapshot(), expected);
    }
}

struct Node {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

impl Node {
    async fn start<N: KvsNode>(node: N) -> Node {
        let server = Server::bind(node, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));
        Node {
            addr,
            shutdown,
            handle,
        }
    }

    fn client(&self) -> RemoteNodeClient {
        RemoteNodeClient::new(self.addr.to_string())
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn cluster_over_tcp() {
    let f1 = Node::start(Follower::new("f1".into())).await;
    let f2 = Node::start(Follower::new("f2".into())).await;
    let peers = vec![f1.client(), f2.client()];
    let leader = Node::start(Leader::new(
        "leader".into(),
        peers,
        2,
        SimulatedDelay::new(Duration::from_micros(100), Duration::from_millis(1)),
    ))
    .await;
    let client = leader.client();

    assert_eq!(client.health().await.unwrap(), Mode::Leader);
    assert_eq!(f1.client().health().await.unwrap(), Mode::Follower);

    let ack = client.write("key1".into(), "value1".into()).await.unwrap();
    assert!(matches!(
        ack,
        WriteAck::Replicated {
            acks: 2,
            required: 2,
            ..
        }
    ));
    let record = f2.client().read("key1".into()).await.unwrap().unwrap();
    assert_eq!(record.value, "value1");
    assert_eq!(record.timestamp, ack.timestamp());

    // Followers refuse client writes.
    assert!(matches!(
        f1.client().write("key1".into(), "x".into()).await,
        Err(Error::Remote(_))
    ));

    let report = measure_write_latency(&client, 2, 20, 4, 5).await.unwrap();
    assert_eq!(report.successes, 20);
    assert_eq!(report.failures, 0);

    let report = check_consistency(&client, &[f1.client(), f2.client()])
        .await
        .unwrap();
    assert_eq!(report.leader_keys, 6);
    assert!(report.is_consistent());

    assert_eq!(client.clear().await.unwrap(), Mode::Leader);
    assert!(client.read_all().await.unwrap().is_empty());
    let report = check_consistency(&client, &[f1.client()]).await.unwrap();
    assert!(report.is_consistent());

    leader.stop().await;
    f1.stop().await;
    f2.stop().await;
}

#[tokio::test]
async fn leader_reports_quorum_failure_over_tcp() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap().to_string();
    drop(listener);

    let peer = RemoteNodeClient::new(dead).with_timeout(Duration::from_millis(200));
    let leader = Node::start(Leader::new(
        "leader".into(),
        vec![peer],
        1,
        SimulatedDelay::none(),
    ))
    .await;
    let client = leader.client();

    let err = client.write("k".into(), "v".into()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::QuorumNotMet {
            acks: 0,
            required: 1
        }
    ));
    assert_eq!(client.read("k".into()).await.unwrap().unwrap().value, "v");

    assert_eq!(client.set_quorum(0).await.unwrap(), 0);
    assert!(client.write("k".into(), "v2".into()).await.is_ok());

    leader.stop().await;
}
