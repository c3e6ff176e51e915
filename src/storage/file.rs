use super::{StorageBackend, StorageMap};
use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Get(Vec<String>, oneshot::Sender<Result<StorageMap>>),
    GetAll(oneshot::Sender<Result<StorageMap>>),
    Set(StorageMap, oneshot::Sender<Result<()>>),
    Remove(Vec<String>, oneshot::Sender<Result<()>>),
    Clear(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<Result<()>>),
}

/// A storage backend persisted as a single JSON object on disk.
///
/// A dedicated worker thread owns the file and the in-memory copy of its
/// contents. Async callers send commands and await the reply, so file I/O
/// never runs on the caller's executor. Every mutating command rewrites the
/// file through a temporary sibling and a rename.
pub struct FileBackend {
    cmd_tx: Sender<Command>,
    path: PathBuf,
}

fn read_items(path: &Path) -> Result<StorageMap> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(StorageMap::new()),
        Ok(text) => serde_json::from_str(&text)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StorageMap::new()),
        Err(e) => Err(Error::BackendError(format!("failed to read {}: {}", path.display(), e))),
    }
}

fn write_items(path: &Path, items: &StorageMap) -> Result<()> {
    let text = serde_json::to_string_pretty(items)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, text)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| Error::BackendError(format!("failed to write {}: {}", path.display(), e)))
}

impl FileBackend {
    /// Open (or lazily create) the store at `path`. Spawns the worker thread
    /// and waits until it has loaded the existing contents.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        let worker_path = path.clone();
        thread::spawn(move || {
            let mut items = match read_items(&worker_path) {
                Ok(items) => items,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            debug!("file backend loaded {} items from {}", items.len(), worker_path.display());
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Get(keys, resp) => {
                        let found = keys
                            .into_iter()
                            .filter_map(|k| items.get(&k).cloned().map(|v| (k, v)))
                            .collect();
                        let _ = resp.send(Ok(found));
                    }
                    Command::GetAll(resp) => {
                        let _ = resp.send(Ok(items.clone()));
                    }
                    Command::Set(batch, resp) => {
                        let mut next = items.clone();
                        next.extend(batch);
                        let res = write_items(&worker_path, &next);
                        if res.is_ok() {
                            items = next;
                        }
                        let _ = resp.send(res);
                    }
                    Command::Remove(keys, resp) => {
                        let mut next = items.clone();
                        for key in &keys {
                            next.remove(key);
                        }
                        let res = write_items(&worker_path, &next);
                        if res.is_ok() {
                            items = next;
                        }
                        let _ = resp.send(res);
                    }
                    Command::Clear(resp) => {
                        let res = write_items(&worker_path, &StorageMap::new());
                        if res.is_ok() {
                            items.clear();
                        }
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::BackendError(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx, path })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the worker thread. Pending commands sent before this one are
    /// still answered.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::BackendError(format!("Close canceled: {}", e)))?
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| {
            warn!("file backend worker for {} is gone", self.path.display());
            Error::BackendError("file backend worker stopped".to_string())
        })
    }

    async fn request<T>(&self, cmd: Command, rx: oneshot::Receiver<Result<T>>, what: &str) -> Result<T> {
        self.send(cmd)?;
        rx.await
            .map_err(|e| Error::BackendError(format!("{} canceled: {}", what, e)))?
    }
}

impl StorageBackend for FileBackend {
    fn get<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<StorageMap>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.request(Command::Get(keys.to_vec(), tx), rx, "Get").await
        }
        .boxed()
    }

    fn get_all(&self) -> BoxFuture<'_, Result<StorageMap>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.request(Command::GetAll(tx), rx, "GetAll").await
        }
        .boxed()
    }

    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<()>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.request(Command::Set(items, tx), rx, "Set").await
        }
        .boxed()
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.request(Command::Remove(keys.to_vec(), tx), rx, "Remove").await
        }
        .boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.request(Command::Clear(tx), rx, "Clear").await
        }
        .boxed()
    }
}
