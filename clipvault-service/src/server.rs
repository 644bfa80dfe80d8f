//! Unix socket server for the presentation shell

use crate::clip::ClipItem;
use crate::clipboard::{write_content, ClipboardSource, MemoryClipboard, SystemClipboard};
use crate::config::{ClipboardBackend, Config};
use crate::history::{HistoryObserver, HistoryService};
use crate::poller::{ClipboardPoller, TickOutcome};
use crate::protocol::{Ack, Request, Response};
use crate::settings::{load_settings, load_theme, save_theme};
use crate::shortcut::{restore_popup_shortcut, set_popup_shortcut, ReservedShortcuts, ShortcutRegistrar};
use crate::storage::{Storage, StorageError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Pending history pushes kept per subscriber before it starts lagging
const UPDATE_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Another instance is already listening on {0:?}")]
    AlreadyRunning(PathBuf),
}

/// Shared state for the clipboard service
struct ServiceState {
    history: HistoryService,
    poller: ClipboardPoller,
    shortcuts: Box<dyn ShortcutRegistrar>,
}

/// Forwards history refreshes to socket subscribers
struct BroadcastObserver {
    sender: broadcast::Sender<Vec<ClipItem>>,
}

impl HistoryObserver for BroadcastObserver {
    fn history_updated(&self, items: &[ClipItem]) {
        if self.sender.send(items.to_vec()).is_err() {
            trace!("No subscribers for history update");
        }
    }
}

/// Clipboard history daemon: polls the clipboard and serves requests on a Unix socket
pub struct ClipVaultServer {
    config: Config,
    state: Arc<Mutex<ServiceState>>,
    updates: broadcast::Sender<Vec<ClipItem>>,
}

impl ClipVaultServer {
    /// Open the configured database and clipboard backend
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let storage = Storage::open(&config.storage.db_path)?;
        info!("Opened clip database at {:?}", config.storage.db_path);

        let source: Box<dyn ClipboardSource> = match config.clipboard.backend {
            ClipboardBackend::System => match SystemClipboard::new() {
                Ok(clipboard) => Box::new(clipboard),
                Err(e) => {
                    warn!("{}, falling back to in-memory clipboard", e);
                    Box::new(MemoryClipboard::new())
                }
            },
            ClipboardBackend::Memory => Box::new(MemoryClipboard::new()),
        };
        let registrar = Box::new(ReservedShortcuts::new(&config.shortcuts.reserved));

        Self::with_parts(config, storage, source, registrar)
    }

    /// Assemble a server from already-built parts
    pub fn with_parts(
        config: Config,
        storage: Storage,
        source: Box<dyn ClipboardSource>,
        mut shortcuts: Box<dyn ShortcutRegistrar>,
    ) -> Result<Self, ServerError> {
        restore_popup_shortcut(&storage, shortcuts.as_mut())?;

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut history = HistoryService::new(storage, config.history.limits());
        history.subscribe(Box::new(BroadcastObserver {
            sender: updates.clone(),
        }));
        let poller = ClipboardPoller::new(source, config.polling.fingerprint_rules());

        let state = Arc::new(Mutex::new(ServiceState {
            history,
            poller,
            shortcuts,
        }));

        Ok(Self {
            config,
            state,
            updates,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.config.server.socket_path
    }

    /// Receive the full history after every mutation
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ClipItem>> {
        self.updates.subscribe()
    }

    /// Log a one-line summary of the stored history
    pub async fn log_stats(&self) {
        let state = self.state.lock().await;
        match state.history.stats() {
            Ok(stats) => info!(
                "History holds {} clips ({} pinned, {} images)",
                stats.clip_count, stats.pinned_count, stats.image_count
            ),
            Err(e) => warn!("Failed to read history stats: {}", e),
        }
    }

    /// Claim the socket. Fails with `AlreadyRunning` if a live daemon answers
    /// on it; a stale socket file is replaced.
    pub async fn bind(&self) -> Result<UnixListener, ServerError> {
        let socket_path = self.socket_path();
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ServerError::AlreadyRunning(socket_path.to_path_buf()));
            }
            debug!("Removing stale socket {:?}", socket_path);
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!("Clipboard service listening on {:?}", socket_path);
        Ok(listener)
    }

    /// Start the server and listen for connections
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind, then serve and poll until `shutdown` completes.
    /// The poller only starts once this instance owns the socket.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        tokio::select! {
            result = self.serve(listener) => result,
            _ = self.run_poller() => Ok(()),
            _ = shutdown => Ok(()),
        }
    }

    /// Accept connections on an already-bound listener
    pub async fn serve(&self, listener: UnixListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&self.state);
                    let updates = self.updates.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state, updates).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Sample the clipboard on a fixed interval, forever
    pub async fn run_poller(&self) {
        let mut interval = tokio::time::interval(self.config.polling.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Polling clipboard every {} ms",
            self.config.polling.interval().as_millis()
        );

        loop {
            interval.tick().await;
            if let TickOutcome::Recorded(item) = self.poll_once().await {
                info!("Captured {} clip {}", item.kind().as_str(), item.id);
            }
        }
    }

    /// Run a single polling tick
    pub async fn poll_once(&self) -> TickOutcome {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        state.poller.tick(&mut state.history)
    }

    /// Handle a single request (for direct integration without socket).
    /// `subscribe` only returns the current history here.
    pub async fn handle(&self, request: Request) -> Response {
        let mut state = self.state.lock().await;
        dispatch(&mut state, request)
    }

    /// Unregister shortcuts and remove the socket file
    pub async fn shutdown(&self) {
        self.state.lock().await.shortcuts.unregister_all();

        let socket_path = self.socket_path();
        if socket_path.exists() {
            if let Err(e) = std::fs::remove_file(socket_path) {
                warn!("Failed to remove socket {:?}: {}", socket_path, e);
            }
        }
        info!("Clipboard service stopped");
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    state: Arc<Mutex<ServiceState>>,
    updates: broadcast::Sender<Vec<ClipItem>>,
) -> Result<(), ServerError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut subscription: Option<broadcast::Receiver<Vec<ClipItem>>> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(Request::Subscribe) => {
                        // subscribe before reading so no update falls in between
                        subscription = Some(updates.subscribe());
                        let state = state.lock().await;
                        history_response(&state.history, "")
                    }
                    Ok(request) => {
                        debug!("Received request: {}", request_name(&request));
                        let mut state = state.lock().await;
                        dispatch(&mut state, request)
                    }
                    Err(e) => {
                        warn!("Failed to parse request: {}", e);
                        Response::error(&format!("Parse error: {}", e))
                    }
                };
                write_response(&mut writer, &response).await?;
            }
            update = recv_update(&mut subscription) => match update {
                Ok(items) => {
                    write_response(&mut writer, &Response::HistoryUpdated { items }).await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, {} history updates dropped", skipped);
                }
                Err(RecvError::Closed) => {
                    subscription = None;
                }
            },
        }
    }

    Ok(())
}

async fn recv_update(
    subscription: &mut Option<broadcast::Receiver<Vec<ClipItem>>>,
) -> Result<Vec<ClipItem>, RecvError> {
    match subscription {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> std::io::Result<()> {
    let response_json = serde_json::to_string(response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Process a single request
fn dispatch(state: &mut ServiceState, request: Request) -> Response {
    match request {
        Request::GetHistory { query } => history_response(&state.history, &query),
        Request::SetClipboard { content } => {
            Response::Ack(write_content(state.poller.source_mut(), &content))
        }
        Request::DeleteClip { id } => storage_ack(state.history.delete(&id)),
        Request::ClearAll => storage_ack(state.history.clear_all()),
        Request::TogglePin { id } => storage_ack(state.history.toggle_pin(&id)),
        Request::SetTags { id, tags } => storage_ack(state.history.set_tags(&id, &tags)),
        Request::GetSettings => match load_settings(state.history.storage()) {
            Ok(settings) => Response::Settings(settings),
            Err(e) => storage_error(e),
        },
        Request::SetPopupShortcut { accelerator } => {
            let storage = state.history.storage();
            match set_popup_shortcut(storage, state.shortcuts.as_mut(), &accelerator) {
                Ok(ack) => Response::Ack(ack),
                Err(e) => storage_ack::<()>(Err(e)),
            }
        }
        Request::GetTheme => match load_theme(state.history.storage()) {
            Ok(theme) => Response::Theme(theme),
            Err(e) => storage_error(e),
        },
        Request::SetTheme { theme } => match save_theme(state.history.storage(), theme) {
            Ok(theme) => Response::Theme(theme),
            Err(e) => storage_error(e),
        },
        Request::Subscribe => history_response(&state.history, ""),
    }
}

fn history_response(history: &HistoryService, query: &str) -> Response {
    match history.query(query) {
        Ok(items) => Response::History { items },
        Err(e) => storage_error(e),
    }
}

/// Unknown ids are not failures; only storage errors are
fn storage_ack<T>(result: Result<T, StorageError>) -> Response {
    match result {
        Ok(_) => Response::Ack(Ack::ok()),
        Err(e) => {
            error!("Storage error: {}", e);
            Response::Ack(Ack::failed(e.to_string()))
        }
    }
}

fn storage_error(e: StorageError) -> Response {
    error!("Storage error: {}", e);
    Response::error(&e.to_string())
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::GetHistory { .. } => "get_history",
        Request::SetClipboard { .. } => "set_clipboard",
        Request::DeleteClip { .. } => "delete_clip",
        Request::ClearAll => "clear_all",
        Request::TogglePin { .. } => "toggle_pin",
        Request::SetTags { .. } => "set_tags",
        Request::GetSettings => "get_settings",
        Request::SetPopupShortcut { .. } => "set_popup_shortcut",
        Request::GetTheme => "get_theme",
        Request::SetTheme { .. } => "set_theme",
        Request::Subscribe => "subscribe",
    }
}
