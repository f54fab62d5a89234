use anyhow::Result;
use futures::{SinkExt, StreamExt};
use loadgen_benchmark::{
    BenchmarkConfig, BenchmarkRunner, NetworkConnector, Protocol, TargetSpec,
};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Accept WebSocket upgrades and echo every data message back to its sender.
async fn spawn_echo_server() -> Result<String> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let url = format!("ws://{}", listener.local_addr()?);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws_stream.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws_stream.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    Ok(url)
}

#[tokio::test]
async fn websocket_round_trip_against_echo_server() -> Result<()> {
    let url = spawn_echo_server().await?;
    let config = BenchmarkConfig {
        clients: 3,
        send_interval: Duration::from_millis(20),
        observation_window: Duration::from_millis(300),
        stop_grace: Duration::from_secs(1),
        ..Default::default()
    };
    let connector = NetworkConnector::new(config.transport_config());
    let target = TargetSpec::new("Loopback WS", url, Protocol::WebSocket);
    let max_ticks = (config.observation_window.as_millis() / config.send_interval.as_millis()) + 1;
    let max_echoes = max_ticks as f64 * (config.clients * config.messages.len()) as f64;

    let result = BenchmarkRunner::new(config, target).run(&connector).await?;

    assert_eq!(result.live_connections, 3);
    assert_eq!(result.sessions_started, 3);
    assert_eq!(result.lost_packets, 0);
    assert!(result.average > 0.0);
    // Each inbound message counts once, so echoes never exceed what was sent.
    assert!(
        result.average <= max_echoes,
        "{} echoes from at most {} sends",
        result.average,
        max_echoes
    );
    Ok(())
}
