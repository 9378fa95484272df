//! Acceptor / worker / checkpointer wiring (spec §4.4, §4.7, §4.8): three
//! long-lived cooperative tasks sharing one [`AggregatorState`] behind a
//! single mutex.

use crate::checkpoint;
use crate::codec::{self, Method, Request};
use crate::config::Config;
use crate::error::AggError;
use crate::handlers;
use crate::model::AggregatorState;
use crate::transport::{self, Connection, Listener};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Runs the aggregator until a Ctrl-C shutdown signal arrives, then
/// performs one best-effort final checkpoint (spec §4.8).
pub async fn run(config: Config) -> Result<(), AggError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let serving = tokio::spawn(serve(config, shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, shutting down anyway");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    match serving.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "serve task panicked");
            Ok(())
        }
    }
}

/// Binds the listener and runs the acceptor/worker/checkpointer tasks until
/// `shutdown_rx` observes `true`. Split out from [`run`] so tests can drive
/// shutdown directly instead of via a process signal.
pub async fn serve(config: Config, shutdown_rx: watch::Receiver<bool>) -> Result<(), AggError> {
    let state = Arc::new(Mutex::new(checkpoint::load(
        &config.checkpoint_path,
        config.expiry_window,
    )));
    let listener = Listener::bind(("0.0.0.0", config.port), config.port).await?;
    info!(port = config.port, "aggregator listening");

    let (conn_tx, conn_rx) = mpsc::channel(crate::config::QUEUE_CAPACITY);

    let acceptor = tokio::spawn(acceptor_loop(
        listener,
        conn_tx,
        state.clone(),
        shutdown_rx.clone(),
    ));
    let worker = tokio::spawn(worker_loop(conn_rx, state.clone(), shutdown_rx.clone()));
    let checkpointer = tokio::spawn(checkpointer_loop(config, state, shutdown_rx));

    let _ = tokio::join!(acceptor, worker, checkpointer);
    info!("aggregator stopped");
    Ok(())
}

/// Repeatedly accepts connections, writes the handshake line, and hands the
/// connection to the worker queue (spec §4.4).
async fn acceptor_loop(
    listener: Listener,
    conn_tx: mpsc::Sender<Connection<TcpStream>>,
    state: Arc<Mutex<AggregatorState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        match listener.accept().await {
            Ok(Some(mut conn)) => {
                let clock_value = state.lock().clock.current();
                if let Err(e) = conn.write_line(&clock_value.to_string()).await {
                    warn!(error = %e, "handshake write failed, dropping connection");
                    continue;
                }
                if conn_tx.send(conn).await.is_err() {
                    // worker gone, nothing left to do
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => error!(error = %e, "accept failed"),
        }
    }
    debug!("acceptor stopped");
}

/// Dequeues connections and serves exactly one request/response per
/// connection (spec §4.4).
async fn worker_loop(
    mut conn_rx: mpsc::Receiver<Connection<TcpStream>>,
    state: Arc<Mutex<AggregatorState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            polled = tokio::time::timeout(crate::config::WORKER_QUEUE_POLL_TIMEOUT, conn_rx.recv()) => {
                match polled {
                    Ok(Some(mut conn)) => handle_connection(&mut conn, &state).await,
                    Ok(None) => break,
                    Err(_elapsed) => continue,
                }
            }
        }
    }
    debug!("worker stopped");
}

async fn handle_connection(conn: &mut Connection<TcpStream>, state: &Mutex<AggregatorState>) {
    let response = match transport::with_read_timeout(codec::read_request(conn)).await {
        Ok(req) => dispatch(state, &req),
        Err(e) => {
            debug!(error = %e, "request read failed");
            e.response_line()
        }
    };
    if let Err(e) = codec::write_response(conn, &response).await {
        warn!(error = %e, "response write failed");
    }
}

fn dispatch(state: &Mutex<AggregatorState>, req: &Request) -> String {
    let now = SystemTime::now();
    let mut guard = state.lock();
    match req.method {
        Method::Put => handlers::handle_put(&mut guard, req, now),
        Method::Get => handlers::handle_get(&mut guard, req, now),
    }
}

/// Periodically snapshots state to disk; takes one final snapshot on
/// shutdown (spec §4.7).
async fn checkpointer_loop(
    config: Config,
    state: Arc<Mutex<AggregatorState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = transport::sleep(config.checkpoint_interval) => {
                if let Err(e) = checkpoint::checkpoint_once(&config.checkpoint_path, &state) {
                    warn!(error = %e, "periodic checkpoint failed");
                } else {
                    debug!("checkpoint written");
                }
            }
        }
    }
    if let Err(e) = checkpoint::checkpoint_once(&config.checkpoint_path, &state) {
        error!(error = %e, "final checkpoint failed");
    } else {
        info!("final checkpoint written");
    }
}
