use bytes::Bytes;
use respd::database::{Database, EchoDatabase};
use respd::protocol::Reply;
use respd::server::listen_and_serve;
use respd::{Connection, RespHandler};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const CLIENTS: usize = 100;
const COMMANDS: usize = 20;

async fn start(db: Arc<dyn Database>) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(RespHandler::new(db));
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(listen_and_serve(listener, handler, async move {
        let _ = stopped.await;
    }));
    (addr, stop, server)
}

fn command(args: &[&[u8]]) -> Vec<u8> {
    Reply::multi_bulk(args.iter().map(|a| Bytes::copy_from_slice(a)).collect()).serialize()
}

/// Counts commands and returns their sequence number as an integer reply.
#[derive(Default)]
struct CountingDatabase {
    executed: AtomicUsize,
}

impl Database for CountingDatabase {
    fn exec(&self, _client: &Connection, args: &[Bytes]) -> Option<Reply> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        let n = std::str::from_utf8(&args[1]).ok()?.parse().ok()?;
        Some(Reply::integer(n))
    }

    fn after_client_close(&self, _client: &Connection) {}

    fn close(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_get_replies_in_order() {
    let db = Arc::new(CountingDatabase::default());
    let (addr, stop, server) = start(db.clone()).await;

    let mut clients = Vec::with_capacity(CLIENTS);
    for c in 0..CLIENTS {
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut expected = Vec::new();

            // Pipeline everything in one write; replies must come back in order
            let mut batch = Vec::new();
            for i in 0..COMMANDS {
                let n = (c * COMMANDS + i).to_string();
                batch.extend(command(&[b"SEQ", n.as_bytes()]));
                expected.extend(Reply::integer(n.parse().unwrap()).serialize());
            }
            stream.write_all(&batch).await.unwrap();

            let mut actual = vec![0u8; expected.len()];
            tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut actual))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(actual, expected, "client {} saw replies out of order", c);
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
    assert_eq!(db.executed.load(Ordering::SeqCst), CLIENTS * COMMANDS);

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_sequential_round_trips() {
    let db = Arc::new(CountingDatabase::default());
    let (addr, stop, server) = start(db.clone()).await;

    let mut clients = Vec::with_capacity(CLIENTS);
    for c in 0..CLIENTS {
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();

            // One command in flight at a time
            for i in 0..COMMANDS {
                let n = (c * COMMANDS + i).to_string();
                stream
                    .write_all(&command(&[b"SEQ", n.as_bytes()]))
                    .await
                    .unwrap();

                let expected = Reply::integer(n.parse().unwrap()).serialize();
                let mut actual = vec![0u8; expected.len()];
                tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut actual))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(actual, expected, "client {} command {} got a wrong reply", c, i);
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
    assert_eq!(db.executed.load(Ordering::SeqCst), CLIENTS * COMMANDS);

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_binary_arguments_survive_the_round_trip() {
    let (addr, stop, server) = start(Arc::new(EchoDatabase::new())).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let request = command(&[b"SET", b"key", b"\r\n\0$3\r\n", b""]);
    stream.write_all(&request).await.unwrap();

    let mut reply = vec![0u8; request.len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, request);

    stop.send(()).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_clients_and_stops_accepting() {
    let (addr, stop, server) = start(Arc::new(EchoDatabase::new())).await;

    let mut idle = Vec::new();
    for _ in 0..10 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&command(&[b"PING"])).await.unwrap();
        let mut buf = [0u8; 14];
        stream.read_exact(&mut buf).await.unwrap();
        idle.push(stream);
    }

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server did not drain")
        .unwrap();

    // Every handler task has finished, so every client sees end of stream
    for mut stream in idle {
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_malformed_input_does_not_end_session() {
    let (addr, stop, server) = start(Arc::new(EchoDatabase::new())).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*x\r\n\r\n$-5\r\n*1\r\n$4\r\nPING\r\n")
        .await
        .unwrap();

    let expected: &[u8] = b"-protocol error: *x\r\n-protocol error: $-5\r\n*1\r\n$4\r\nPING\r\n";
    let mut reply = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, expected);

    stop.send(()).unwrap();
    server.await.unwrap();
}
