use std::time::Duration;

use futures::stream::futures_unordered::FuturesUnordered;
use tokio::stream::StreamExt;

use guandan_game::protocol::{ServerAction, ServerMessage};
use guandan_game::server as game_server;
use guandan_server::{run, settings};

// Ensure that:
//
// - a server can be started.
// - a batch of clients can connect and all receive the slot greeting.
// - the server receives the shutdown notification.
// - all client tasks stop.
// - the server shuts down gracefully.
#[tokio::test(core_threads = 8)]
async fn graceful_shutdown() {
    flexi_logger::Logger::with_env()
        .format(|w, now, r| flexi_logger::with_thread(w, now, r))
        .start()
        .ok();
    // Spawn server.
    let bind_addr = "127.0.0.1:3941";
    let client_bind_addr = "ws://127.0.0.1:3941/ws";
    let server_settings = settings::Server {
        bind_addr: bind_addr.into(),
    };
    let (shutdown_tx, shutdown_rx) = piper::chan(0);
    let game = game_server::Settings::default();
    let server = tokio::spawn(async move { run(server_settings, game, shutdown_rx).await.ok() });

    // Hack: wait a bit for the server to be ready.
    tokio::time::delay_for(Duration::from_millis(150)).await;

    // Spawn many clients in parallel.
    const NUM_CLIENTS: usize = 50;
    let mut connections = FuturesUnordered::new();
    for _id in 0..NUM_CLIENTS {
        connections.push(tokio::spawn(async move {
            match tokio_tungstenite::connect_async(client_bind_addr).await {
                Ok((mut stream, _)) => {
                    // The server greets every connection with the free
                    // seat list before any request.
                    let greeting = stream
                        .next()
                        .await
                        .expect("server to greet")
                        .expect("greeting to be readable")
                        .into_text()
                        .expect("greeting to be text");
                    let msg: ServerMessage =
                        serde_json::from_str(&greeting).expect("greeting to parse");
                    Ok((stream, msg))
                }
                Err(e) => Err(e),
            }
        }));
    }

    // Wait for all clients to get their greeting.
    let mut clients = Vec::with_capacity(NUM_CLIENTS);
    while let Some(client_task) = connections.next().await {
        let client = client_task.expect("client");
        clients.push(client);
    }

    // Ensure every client was greeted with the full slot list.
    for client in clients.iter() {
        let &(_, ref msg) = client.as_ref().expect("clients to succeed");
        assert_eq!(msg.action, ServerAction::AvailableSlots);
        assert_eq!(msg.data, "0 1 2 3");
    }

    // Tell server to shutdown.
    drop(shutdown_tx);
    let stats = server
        .await
        .expect("server shutdown smoothly")
        .expect("server shutdown smoothly");

    // Ensure the server agrees with us.
    assert_eq!(stats.total_accepted_connections, NUM_CLIENTS);
    drop(clients);
}
