//! HTTP surface for a live population.
//!
//! One task owns the [`Engine`] and advances it from the wall clock; request
//! handlers reach it only through a command channel, so every mutation is
//! serialized on that task.

use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    Stream, StreamExt,
};
use tracing::{error, info, warn};

use crate::{
    engine::{CollectOutcome, Engine},
    scenario::Scenario,
    view::FrameSnapshot,
    world::{Millis, ToolId},
};

const COMMAND_QUEUE: usize = 64;
const FRAME_QUEUE: usize = 256;

enum Command {
    Collect {
        id: ToolId,
        reply: oneshot::Sender<Result<CollectOutcome>>,
    },
    Reset {
        reply: oneshot::Sender<Result<FrameSnapshot>>,
    },
    Frame {
        reply: oneshot::Sender<FrameSnapshot>,
    },
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("population engine is not running")]
    Unavailable,
    #[error("engine failure: {0}")]
    Engine(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match self {
            WebError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            WebError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Cloneable access to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    frames: broadcast::Sender<String>,
    shutdown: Arc<watch::Sender<bool>>,
    scenario: Arc<str>,
}

impl EngineHandle {
    pub async fn collect(&self, id: ToolId) -> Result<CollectOutcome, WebError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Collect { id, reply }).await?;
        Ok(rx.await.map_err(|_| WebError::Unavailable)??)
    }

    pub async fn reset(&self) -> Result<FrameSnapshot, WebError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        Ok(rx.await.map_err(|_| WebError::Unavailable)??)
    }

    pub async fn frame(&self) -> Result<FrameSnapshot, WebError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Frame { reply }).await?;
        rx.await.map_err(|_| WebError::Unavailable)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.frames.subscribe()
    }

    /// Stops the engine task and ends every open event stream, even while
    /// other handles are still alive.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn send(&self, command: Command) -> Result<(), WebError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WebError::Unavailable)
    }
}

/// Starts the engine on its own task, ticking every `tick`.
///
/// The task stops the engine and exits on [`EngineHandle::shutdown`] or once
/// every handle is dropped.
pub fn spawn_engine(
    engine: Engine,
    scenario: &str,
    tick: Duration,
) -> (EngineHandle, JoinHandle<Result<()>>) {
    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let (frames, _) = broadcast::channel(FRAME_QUEUE);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = EngineHandle {
        commands,
        frames: frames.clone(),
        shutdown: Arc::new(shutdown),
        scenario: Arc::from(scenario),
    };
    let task = tokio::spawn(drive(engine, rx, frames, shutdown_rx, tick));
    (handle, task)
}

async fn drive(
    mut engine: Engine,
    mut commands: mpsc::Receiver<Command>,
    frames: broadcast::Sender<String>,
    mut shutdown: watch::Receiver<bool>,
    tick: Duration,
) -> Result<()> {
    engine.start()?;
    let epoch = Instant::now();
    let base = engine.now();
    let elapsed = || base + epoch.elapsed().as_millis() as Millis;
    let mut ticker = tokio::time::interval(tick);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                engine.advance_to(elapsed())?;
                publish(&engine, &frames);
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                engine.advance_to(elapsed())?;
                match command {
                    Command::Collect { id, reply } => {
                        let outcome = engine.collect(id);
                        let _ = reply.send(outcome);
                        publish(&engine, &frames);
                    }
                    Command::Reset { reply } => {
                        let frame = engine.reset().map(|()| engine.frame());
                        let _ = reply.send(frame);
                        publish(&engine, &frames);
                    }
                    Command::Frame { reply } => {
                        let _ = reply.send(engine.frame());
                    }
                }
            }
        }
    }

    engine.stop();
    info!(now = engine.now(), "engine task exiting");
    Ok(())
}

fn publish(engine: &Engine, frames: &broadcast::Sender<String>) {
    if frames.receiver_count() == 0 {
        return;
    }
    match serde_json::to_string(&engine.frame()) {
        Ok(payload) => {
            let _ = frames.send(payload);
        }
        Err(err) => warn!("failed to encode frame: {err}"),
    }
}

#[derive(Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub generated_at: DateTime<Utc>,
    pub frame: FrameSnapshot,
}

pub fn router(handle: EngineHandle) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/tools/:id/collect", post(collect_tool))
        .route("/api/reset", post(reset_population))
        .route("/api/events", get(stream_events))
        .with_state(handle)
}

async fn latest_state(State(handle): State<EngineHandle>) -> Result<Json<StateEnvelope>, WebError> {
    let frame = handle.frame().await?;
    Ok(Json(StateEnvelope {
        scenario: handle.scenario.to_string(),
        generated_at: Utc::now(),
        frame,
    }))
}

async fn collect_tool(
    State(handle): State<EngineHandle>,
    Path(id): Path<u64>,
) -> Result<Json<CollectOutcome>, WebError> {
    Ok(Json(handle.collect(ToolId::new(id)).await?))
}

async fn reset_population(State(handle): State<EngineHandle>) -> Result<Json<FrameSnapshot>, WebError> {
    Ok(Json(handle.reset().await?))
}

enum Feed {
    Frame(String),
    Closed,
}

async fn stream_events(
    State(handle): State<EngineHandle>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames = BroadcastStream::new(handle.subscribe()).filter_map(|msg| msg.ok().map(Feed::Frame));
    let closed = WatchStream::new(handle.shutdown.subscribe())
        .filter(|closed| *closed)
        .map(|_| Feed::Closed);
    let stream = frames
        .merge(closed)
        .take_while(|feed| matches!(feed, Feed::Frame(_)))
        .filter_map(|feed| match feed {
            Feed::Frame(payload) => Some(Ok(Event::default().data(payload))),
            Feed::Closed => None,
        });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub host: String,
    pub port: u16,
    pub tick: Duration,
}

pub async fn serve(config: WebServerConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(listener, config.scenario, config.tick, shutdown_signal()).await
}

/// Serves on an already bound listener until `signal` resolves, then stops
/// the engine, closes event streams and waits for the engine task.
pub async fn serve_on<F>(
    listener: TcpListener,
    scenario: Scenario,
    tick: Duration,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let engine = scenario.engine()?;
    let (handle, engine_task) = spawn_engine(engine, &scenario.name, tick);
    let router = router(handle.clone());
    info!(addr = ?listener.local_addr().ok(), scenario = %scenario.name, "serving floating tools");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            handle.shutdown();
        })
        .await?;

    match engine_task.await {
        Ok(Ok(())) => {
            info!("engine task finished");
            Ok(())
        }
        Ok(Err(err)) => {
            error!("engine task failed: {err:#}");
            Err(err)
        }
        Err(err) => Err(anyhow::anyhow!("engine task panicked: {err}")),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
