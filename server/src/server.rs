use std::error::Error;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_local_bounded_channel as spsc_async;
use futures::channel::mpsc;
use futures::future::select;
use futures::pin_mut;
use futures::SinkExt;
use log::{debug, error, info};
use tokio;
use tokio::stream::StreamExt;

use typenum::U2;
use warp::filters::ws::{Message, WebSocket};
use warp::Filter;

use guandan_game::protocol::{ClientMessage, ServerAction, ServerMessage};
use guandan_game::server::{Core, ResponseRx, ResponseTx, TurnStart};

use crate::settings;

/// Execute the entire life-cycle of the guandan server.
pub async fn run(
    server: settings::Server,
    game: guandan_game::server::Settings,
    shutdown_rx: piper::Receiver<()>,
) -> Result<Stats, Box<dyn Error>> {
    // Channel to indicate that all client tasks have terminated.
    let (terminated_tx, terminated_rx) = piper::chan(0);

    // Keep track of some basic statistics.
    let total_accepted_connections = Arc::new(AtomicUsize::new(0));

    // Start the WebSocket server.
    start_server(
        server,
        game,
        shutdown_rx,
        terminated_tx,
        total_accepted_connections.clone(),
    )
    .await;

    // Handle graceful shutdown.
    info!("waiting for client tasks to terminate");
    terminated_rx.recv().await;

    Ok(Stats {
        total_accepted_connections: total_accepted_connections.load(Ordering::Acquire),
    })
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stats {
    pub total_accepted_connections: usize,
}

async fn start_server(
    server: settings::Server,
    game: guandan_game::server::Settings,
    shutdown_rx: piper::Receiver<()>,
    terminated_tx: piper::Sender<()>,
    total_accepted_connections: Arc<AtomicUsize>,
) {
    // Create the global state.
    let (guard, weak_guard) = make_guard(game, shutdown_rx.clone(), terminated_tx.clone());

    // Accept websocket connections on /ws.
    let websocket_server = warp::path("ws")
        .and(warp::ws())
        .and(warp::addr::remote())
        .map(move |ws: warp::ws::Ws, addr: Option<SocketAddr>| {
            let handle = {
                let guard = weak_guard.upgrade().expect("server running");
                guard.new_client()
            };
            let total_accepted_connections = total_accepted_connections.clone();
            ws.on_upgrade(move |stream| async move {
                if let Some(addr) = addr {
                    total_accepted_connections.fetch_add(1, Ordering::Release);
                    info!("accepted connection from {}", addr);
                    handle_client(handle, stream, addr).await;
                } else {
                    error!("no address for incoming connection")
                }
            })
        });

    // Determine bind address
    let bind_addr = server
        .bind_addr
        .to_socket_addrs()
        .expect("valid bind address")
        .next()
        .expect("at least one address");

    // Start the server!
    let shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let (addr, server) =
            warp::serve(websocket_server).bind_with_graceful_shutdown(bind_addr, async move {
                shutdown_rx.recv().await;
                info!("received shutdown notice");
                drop(terminated_tx);
            });
        info!("running on {}", addr);

        // Wait for the server to stop.
        server.await;
        info!("web server stopped");
    });

    // Wait for shutdown, then begin graceful termination.
    shutdown.recv().await;
    drop(guard);
}

// The limit of pending requests from a particular client.
type RequestCapacity = U2;

type RequestTx<'a> = spsc_async::Sender<'a, ClientMessage, RequestCapacity>;
type RequestRx<'a> = spsc_async::Receiver<'a, ClientMessage, RequestCapacity>;

async fn handle_client(handle: ClientHandle, stream: WebSocket, addr: SocketAddr) {
    // setup communication channels
    let (state, shutdown_rx, terminated_tx) = handle.split();
    let (response_tx, response_rx) = mpsc::unbounded();
    let mut requests = spsc_async::channel::<ClientMessage, RequestCapacity>();
    let (request_tx, request_rx) = requests.split();
    // setup task loops
    let connection = process_connection(
        shutdown_rx.clone(),
        stream,
        addr,
        response_rx,
        response_tx.clone(),
        request_tx,
    );
    let request = handle_requests(state, shutdown_rx, addr, request_rx, response_tx);
    pin_mut!(connection, request);
    // run task loops interleaved, and wait for both to finish.
    select(connection, request).await.factor_first().1.await;
    info!("finished handling {}", addr);
    // notify main task that we're done.
    drop(terminated_tx);
}

async fn process_connection(
    mut shutdown_rx: piper::Receiver<()>,
    mut stream: WebSocket,
    addr: SocketAddr,
    mut response_rx: ResponseRx,
    notice_tx: ResponseTx,
    mut request_tx: RequestTx<'_>,
) {
    debug!("starting connection processing loop for {}", addr);
    loop {
        tokio::select! {
            // Server shutting down
            _ = shutdown_rx.next() => {
                break
            },
            // Write out response to socket
            Some(resp) = response_rx.next() =>
                send_response(&resp, &mut stream, &addr).await,
            // Receive request from socket
            msg = stream.next() =>
                if forward_request(msg, &mut request_tx, &notice_tx, &addr).await {
                    break;
                }
        }
    }
}

async fn send_response(resp: &ServerMessage, stream: &mut WebSocket, addr: &SocketAddr) {
    match serde_json::to_string(resp) {
        Ok(json) => {
            if let Err(e) = stream.send(Message::text(json)).await {
                error!("while sending response to {}: {}", addr, e);
            }
        }
        Err(e) => error!("while serializing response to {}: {}", addr, e),
    }
}

async fn forward_request(
    msg: Option<Result<Message, warp::Error>>,
    request_tx: &mut RequestTx<'_>,
    notice_tx: &ResponseTx,
    addr: &SocketAddr,
) -> bool {
    let msg = match msg {
        Some(msg) => msg,
        None => return true,
    };
    match msg {
        Ok(msg) => {
            let data = msg.into_bytes();
            if data.is_empty() {
                return true;
            }
            match serde_json::from_slice(&data) {
                Ok(req) => {
                    if request_tx.send(req).await.is_err() {
                        return true;
                    }
                }
                Err(e) => {
                    // A malformed envelope gets an error notice; the
                    // connection stays open.
                    error!("deserializing request from {}: {}", addr, e);
                    let notice = ServerMessage::new(
                        ServerAction::Error,
                        format!("malformed message: {}", e),
                    );
                    notice_tx.unbounded_send(notice).ok();
                }
            }
        }
        Err(e) => error!("reading message from {}: {}", addr, e),
    }
    false
}

async fn handle_requests(
    state: Arc<State>,
    mut shutdown_rx: piper::Receiver<()>,
    addr: SocketAddr,
    mut request_rx: RequestRx<'_>,
    response_tx: ResponseTx,
) {
    let mut hard_stop = false;
    let mut context = state.get_core().register(response_tx).await;

    debug!("starting request handling loop for {}", addr);
    loop {
        tokio::select! {
            _ = shutdown_rx.next() => {
                debug!("received notification to stop handling {}", addr);
                hard_stop = true;
                break;
            },
            opt_request = request_rx.receive() => match opt_request {
                Ok(req) => {
                    if let Some(turn) = context.execute(req).await {
                        spawn_deadline(state.clone(), turn);
                    }
                },
                Err(_) => {
                    debug!("apparent death of sibling task for {}", addr);
                    break;
                },
            }
        }
    }

    if !(hard_stop || state.stopping()) {
        debug!("cleaning up {}", addr);
        context.cleanup().await;
    }
}

/// Arm the per-turn deadline. The chain keeps itself alive for as long as
/// its auto-actions keep starting new turns; a turn advanced by a real play
/// makes the pending deadline a no-op.
fn spawn_deadline(state: Arc<State>, turn: TurnStart) {
    let timeout = Duration::from_secs(state.get_core().settings().turn_timeout_secs);
    tokio::spawn(async move {
        let mut next = Some(turn);
        while let Some(turn) = next {
            tokio::time::delay_for(timeout).await;
            if state.stopping() {
                break;
            }
            next = state.get_core().turn_deadline(turn).await;
        }
    });
}

/// The global state of the whole server.
pub struct State {
    stopping: AtomicBool,
    core: Arc<Core>,
}

impl State {
    /// Create a new, empty server state.
    fn new(settings: guandan_game::server::Settings) -> Self {
        State {
            stopping: AtomicBool::new(false),
            core: Arc::new(Core::new(settings)),
        }
    }

    pub fn get_core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Inquire whether the server is in the process of shutting down.
    pub fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

/// Create a new, empty server state, and return a guard for it.
pub fn make_guard(
    settings: guandan_game::server::Settings,
    shutdown_rx: piper::Receiver<()>,
    terminated_tx: piper::Sender<()>,
) -> (Arc<Guard>, Weak<Guard>) {
    let state = Arc::new(State::new(settings));
    let guard = Guard {
        state,
        shutdown_rx,
        terminated_tx,
    };
    let guard = Arc::new(guard);
    let weak_guard = Arc::downgrade(&guard);
    (guard, weak_guard)
}

/// Ensures that client tasks receive notification of server shutdown.
///
/// This type implements `Drop`, on which it flips the stopping flag so that
/// client tasks skip per-client cleanup. The main server loop should be
/// arranged so that no matter how it exits, this guard gets dropped.
pub struct Guard {
    state: Arc<State>,
    shutdown_rx: piper::Receiver<()>,
    terminated_tx: piper::Sender<()>,
}

impl Guard {
    /// Create a handle for a new incoming client.
    pub fn new_client(&self) -> ClientHandle {
        ClientHandle {
            state: self.state.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
            terminated_tx: self.terminated_tx.clone(),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        debug!("dropping guard");
        self.state.stopping.store(true, Ordering::Release);
    }
}

/// A handle to the state and shutdown notifications for new clients.
#[derive(Clone)]
pub struct ClientHandle {
    state: Arc<State>,
    shutdown_rx: piper::Receiver<()>,
    terminated_tx: piper::Sender<()>,
}

impl ClientHandle {
    /// Consume the handle to acquire its members.
    pub fn split(self) -> (Arc<State>, piper::Receiver<()>, piper::Sender<()>) {
        (self.state, self.shutdown_rx, self.terminated_tx)
    }
}
