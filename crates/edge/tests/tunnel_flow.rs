//! Integration tests exercising the edge crate's public API end to end
//! against a mocked terminator, with an in-test "agent" driving the
//! control and data connections by hand. Covers the happy path, the
//! domain-normalization case, the pairing timeout, a stale `data_init`,
//! and two interleaved public connections.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tunnel_edge::{ControlPlane, EdgeConfig, PairingTable, TerminatorClient, TunnelRegistry};
use tunnel_protocol::{read_message, write_message, ControlMessage};

type Routes = Arc<Mutex<Vec<serde_json::Value>>>;

/// Starts an in-process mock of the terminator's admin API, backed by an
/// in-memory route list, and returns its base URL.
async fn spawn_mock_terminator() -> String {
    let routes: Routes = Arc::new(Mutex::new(Vec::new()));

    async fn list_routes(State(routes): State<Routes>) -> Json<Vec<serde_json::Value>> {
        Json(routes.lock().unwrap().clone())
    }
    async fn add_route(State(routes): State<Routes>, Json(route): Json<serde_json::Value>) {
        routes.lock().unwrap().push(route);
    }
    async fn delete_route(State(routes): State<Routes>, Path(index): Path<usize>) {
        let mut routes = routes.lock().unwrap();
        if index < routes.len() {
            routes.remove(index);
        }
    }

    let app = Router::new()
        .route(
            "/config/apps/http/servers/srv0/routes",
            get(list_routes).post(add_route),
        )
        .route(
            "/config/apps/http/servers/srv0/routes/{index}",
            delete(delete_route),
        )
        .with_state(routes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

/// Starts a loopback echo server standing in for the agent's local
/// service, returning its address.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

struct Harness {
    control_addr: SocketAddr,
    data_addr: SocketAddr,
}

/// Binds control and data listeners and spawns their accept loops against
/// a fresh registry/pairing table wired to a mock terminator.
async fn spawn_edge(terminator_url: String, disable_health_check: bool) -> Harness {
    let config = Arc::new(EdgeConfig {
        public_ip: "127.0.0.1".to_string(),
        disable_health_check,
        terminator_url,
        default_domain: "ex.test".to_string(),
        public_port_override: None,
    });
    let registry = Arc::new(TunnelRegistry::new(TerminatorClient::new(
        config.terminator_url.clone(),
    )));
    let pairing = Arc::new(PairingTable::new());
    let control_plane = ControlPlane {
        registry,
        pairing: pairing.clone(),
        config,
    };

    let control_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let control_addr = control_listener.local_addr().unwrap();
    let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let data_addr = data_listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, peer)) = control_listener.accept().await else {
                return;
            };
            let control_plane = control_plane.clone();
            tokio::spawn(async move { control_plane.handle_connection(stream, peer).await });
        }
    });
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = data_listener.accept().await else {
                return;
            };
            let pairing = pairing.clone();
            tokio::spawn(async move { tunnel_edge::data_plane::handle_connection(pairing, stream).await });
        }
    });

    Harness { control_addr, data_addr }
}

async fn open_tunnel(
    harness: &Harness,
    domain: &str,
) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf, String, u16, String) {
    let stream = TcpStream::connect(harness.control_addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_message(
        &mut write_half,
        &ControlMessage::OpenTunnel {
            client_id: "A".to_string(),
            local_hint: "3000".to_string(),
            domain: domain.to_string(),
            local_url: "http://localhost:3000".to_string(),
        },
    )
    .await
    .unwrap();

    match read_message(&mut reader).await.unwrap() {
        ControlMessage::TunnelOpened {
            tunnel_id,
            public_addr,
            public_host,
        } => {
            let port = public_addr.rsplit_once(':').unwrap().1.parse().unwrap();
            (reader, write_half, tunnel_id, port, public_host)
        }
        other => panic!("expected tunnel_opened, got {other:?}"),
    }
}

#[tokio::test]
async fn s1_happy_path_pumps_bytes_and_tears_down_on_close() {
    let terminator_url = spawn_mock_terminator().await;
    let harness = spawn_edge(terminator_url.clone(), true).await;
    let echo_addr = spawn_echo_server().await;

    let (mut ctl_reader, mut ctl_writer, tunnel_id, public_port, public_host) =
        open_tunnel(&harness, "*.ex.test").await;
    assert_eq!(tunnel_id.len(), 16);
    assert!(public_host.ends_with(".ex.test"));

    let mut public_client = TcpStream::connect(("127.0.0.1", public_port)).await.unwrap();

    // Agent side: the edge asked for a data connection; dial it and
    // announce it, then bridge to the "local service" (the echo server).
    let conn_request = read_message(&mut ctl_reader).await.unwrap();
    let (req_tunnel_id, conn_id) = match conn_request {
        ControlMessage::ConnRequest { tunnel_id, conn_id } => (tunnel_id, conn_id),
        other => panic!("expected conn_request, got {other:?}"),
    };
    assert_eq!(req_tunnel_id, tunnel_id);

    let mut data_conn = TcpStream::connect(harness.data_addr).await.unwrap();
    write_message(
        &mut data_conn,
        &ControlMessage::DataInit {
            tunnel_id: tunnel_id.clone(),
            conn_id,
        },
    )
    .await
    .unwrap();
    let local_conn = TcpStream::connect(echo_addr).await.unwrap();
    tokio::spawn(async move {
        tunnel_protocol::byte_pump(data_conn, local_conn).await;
    });

    public_client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    public_client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    drop(ctl_writer);
    drop(ctl_reader);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(TcpStream::connect(("127.0.0.1", public_port)).await.is_err());

    let client = reqwest::Client::new();
    let routes: Vec<serde_json::Value> = client
        .get(format!("{terminator_url}/config/apps/http/servers/srv0/routes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(routes.iter().all(|r| {
        r["match"][0]["host"][0].as_str() != Some(public_host.as_str())
    }));
}

#[tokio::test]
async fn s2_domain_without_leading_wildcard_is_unchanged() {
    let terminator_url = spawn_mock_terminator().await;
    let harness = spawn_edge(terminator_url, true).await;

    let (_reader, _writer, _tunnel_id, _port, public_host) =
        open_tunnel(&harness, "apps.ex.test").await;
    assert!(public_host.ends_with(".apps.ex.test"));
    assert!(!public_host.contains('*'));
}

#[tokio::test]
async fn s3_agent_never_dials_data_closes_after_pairing_timeout() {
    let terminator_url = spawn_mock_terminator().await;
    let harness = spawn_edge(terminator_url, true).await;

    let (mut ctl_reader, _ctl_writer, _tunnel_id, public_port, _public_host) =
        open_tunnel(&harness, "*.ex.test").await;

    let public_client = TcpStream::connect(("127.0.0.1", public_port)).await.unwrap();
    let _ = read_message(&mut ctl_reader).await.unwrap(); // conn_request, ignored

    let mut public_client = public_client;
    let mut buf = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_secs(11), public_client.read(&mut buf)).await;
    match result {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!("expected EOF, got {n} bytes"),
        Ok(Err(_)) => {}
        Err(_) => panic!("edge did not close the public connection within the pairing timeout"),
    }
}

#[tokio::test]
async fn s4_stale_data_init_closes_silently() {
    let terminator_url = spawn_mock_terminator().await;
    let harness = spawn_edge(terminator_url, true).await;

    let mut data_conn = TcpStream::connect(harness.data_addr).await.unwrap();
    write_message(
        &mut data_conn,
        &ControlMessage::DataInit {
            tunnel_id: "t1".to_string(),
            conn_id: "deadbeefdeadbeef".to_string(),
        },
    )
    .await
    .unwrap();

    let mut buf = [0u8; 1];
    let n = data_conn.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "edge should close the connection for an unknown conn_id");
}

#[tokio::test]
async fn s5_two_concurrent_public_connections_pair_independently() {
    let terminator_url = spawn_mock_terminator().await;
    let harness = spawn_edge(terminator_url, true).await;

    let (mut ctl_reader, _ctl_writer, tunnel_id, public_port, _public_host) =
        open_tunnel(&harness, "*.ex.test").await;

    let mut client1 = TcpStream::connect(("127.0.0.1", public_port)).await.unwrap();
    let mut client2 = TcpStream::connect(("127.0.0.1", public_port)).await.unwrap();

    let conn_id_1 = match read_message(&mut ctl_reader).await.unwrap() {
        ControlMessage::ConnRequest { conn_id, .. } => conn_id,
        other => panic!("expected conn_request, got {other:?}"),
    };
    let conn_id_2 = match read_message(&mut ctl_reader).await.unwrap() {
        ControlMessage::ConnRequest { conn_id, .. } => conn_id,
        other => panic!("expected conn_request, got {other:?}"),
    };
    assert_ne!(conn_id_1, conn_id_2);

    // Respond in reversed order: conn #2's data connection arrives first.
    for conn_id in [conn_id_2, conn_id_1] {
        let mut data_conn = TcpStream::connect(harness.data_addr).await.unwrap();
        write_message(
            &mut data_conn,
            &ControlMessage::DataInit {
                tunnel_id: tunnel_id.clone(),
                conn_id,
            },
        )
        .await
        .unwrap();
        // Echo whatever arrives on the data side back to it, so each
        // public client can be told apart by its own reply.
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                match data_conn.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if data_conn.write_all(&buf[..n]).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    client1.write_all(b"one").await.unwrap();
    client2.write_all(b"two").await.unwrap();

    let mut buf1 = [0u8; 3];
    client1.read_exact(&mut buf1).await.unwrap();
    assert_eq!(&buf1, b"one");

    let mut buf2 = [0u8; 3];
    client2.read_exact(&mut buf2).await.unwrap();
    assert_eq!(&buf2, b"two");
}
