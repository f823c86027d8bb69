
// End-to-end tests over real sockets
#[cfg(test)]
mod tests {
    use crate::*;
    use futures_util::{SinkExt, StreamExt};
    use std::future::Future;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
    use tracing::debug;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            hub: HubConfig {
                tick_interval_ms: 20,
                ..HubConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    async fn start(config: ServerConfig) -> (Arc<RelayServer>, SocketAddr, JoinHandle<Result<(), ServerError>>) {
        let listener = TcpListener::bind(config.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(create_server_with_config(config));
        let task = {
            let server = server.clone();
            tokio::spawn(async move { server.start_with_listener(listener).await })
        };
        (server, addr, task)
    }

    async fn connect(addr: SocketAddr, player: &str) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}/ws?playerId={player}"))
            .await
            .expect("Failed to connect");
        ws
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..400 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn next_snapshot(ws: &mut Client) -> Snapshot {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for snapshot")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).expect("snapshot JSON");
            }
        }
    }

    async fn http_request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                    .as_bytes(),
            )
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_reaches_every_client() {
        let (server, addr, _task) = start(test_config()).await;
        let mut p1 = connect(addr, "p1").await;
        let mut p2 = connect(addr, "p2").await;
        let hub = server.hub();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().active_sessions() == 2 }
        })
        .await;

        p1.send(Message::text(r#"{"id":"p1","x":10,"y":20,"velocity":5,"angle":1.57}"#))
            .await
            .unwrap();

        for client in [&mut p1, &mut p2] {
            loop {
                let snapshot = next_snapshot(client).await;
                let Some(player) = snapshot.players.get("p1") else {
                    continue;
                };
                if player.x == 10.0 {
                    assert_eq!((player.y, player.velocity, player.angle), (20.0, 5.0, 1.57));
                    assert_eq!(snapshot.players["p2"], Player::spawn("p2".into()));
                    break;
                }
            }
        }
        debug!("both clients saw the update");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_generated_player_id_when_absent() {
        let (server, addr, _task) = start(test_config()).await;
        let (_ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let game = server.hub().game();
        eventually(|| {
            let game = game.clone();
            async move { game.len().await == 1 }
        })
        .await;
        let snapshot = game.snapshot().await;
        let id = snapshot.players.keys().next().unwrap();
        assert_eq!(id.as_str().len(), 32);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_removes_player() {
        let (server, addr, _task) = start(test_config()).await;
        let mut leaving = connect(addr, "leaving").await;
        let mut staying = connect(addr, "staying").await;
        while next_snapshot(&mut staying).await.players.len() < 2 {}

        leaving.close(None).await.unwrap();

        loop {
            let snapshot = next_snapshot(&mut staying).await;
            if !snapshot.players.contains_key("leaving") {
                assert!(snapshot.players.contains_key("staying"));
                break;
            }
        }
        let hub = server.hub();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().active_sessions() == 1 }
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_endpoint() {
        let (_server, addr, _task) = start(test_config()).await;
        let response = http_request(addr, "GET", "/api/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(response.ends_with(r#"{"status":"ok"}"#));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_rejects_other_methods() {
        let (_server, addr, _task) = start(test_config()).await;
        let response = http_request(addr, "POST", "/api/health").await;
        assert!(response.starts_with("HTTP/1.1 405"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_path_is_not_found() {
        let (_server, addr, _task) = start(test_config()).await;
        let response = http_request(addr, "GET", "/index.html").await;
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_player_id_rejected() {
        let (server, addr, _task) = start(test_config()).await;
        let long_id = "x".repeat(65);
        assert!(connect_async(format!("ws://{addr}/ws?playerId={long_id}")).await.is_err());
        assert!(server.hub().game().is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 1,
            ..test_config()
        };
        let (server, addr, _task) = start(config).await;
        let _first = connect(addr, "first").await;
        let hub = server.hub();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().active_sessions() == 1 }
        })
        .await;

        assert!(connect_async(format!("ws://{addr}/ws?playerId=second")).await.is_err());
        assert!(!server.hub().game().contains("second").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_upgrades_respect_limit() {
        let config = ServerConfig {
            max_connections: 2,
            ..test_config()
        };
        let (server, addr, _task) = start(config).await;

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                tokio::spawn(async move { connect_async(format!("ws://{addr}/ws?playerId=racer{i}")).await })
            })
            .collect();
        let mut accepted = Vec::new();
        for attempt in attempts {
            if let Ok((ws, _)) = attempt.await.unwrap() {
                accepted.push(ws);
            }
        }

        assert_eq!(accepted.len(), 2);
        let hub = server.hub();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().active_sessions() == 2 }
        })
        .await;
        assert_eq!(server.hub().game().len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slot_released_when_session_ends() {
        let config = ServerConfig {
            max_connections: 1,
            ..test_config()
        };
        let (_server, addr, _task) = start(config).await;

        let mut first = connect(addr, "first").await;
        first.close(None).await.unwrap();
        drop(first);

        for _ in 0..400 {
            if let Ok((_second, _)) = connect_async(format!("ws://{addr}/ws?playerId=second")).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("slot was never released");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_closes_clients() {
        let (server, addr, task) = start(test_config()).await;
        let mut client = connect(addr, "p1").await;
        let hub = server.hub();
        eventually(|| {
            let hub = hub.clone();
            async move { hub.stats().active_sessions() == 1 }
        })
        .await;

        server.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();

        // Drain queued snapshots until the server's Close frame or stream end.
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(frame) = client.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_starts_only_once() {
        let (server, _addr, _task) = start(test_config()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        // Wait for the first start to claim the hub.
        let hub = server.hub();
        let (marker, _io) = hub.open_session(Some("marker"));
        hub.register(marker.handle()).await.unwrap();

        assert!(matches!(
            server.start_with_listener(listener).await,
            Err(ServerError::Internal(_))
        ));
    }

    #[test]
    fn test_server_config_defaults() {
        let server = create_server();
        let config = server.config();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.hub.tick_interval_ms, 100);
        assert!(config.validate().is_ok());
    }
}
