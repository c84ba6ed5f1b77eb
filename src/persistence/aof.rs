use crate::resp::{RespParser, RespValue};
use crate::store::DataStore;
use bytes::BytesMut;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

enum Message {
    Command { db: usize, args: Vec<Vec<u8>> },
    Close,
}

/// Append-only log of write commands. Logging never blocks the caller: each
/// record is queued to a background task that owns the file. A `SELECT` is
/// written whenever the database differs from the previous record's.
#[derive(Debug)]
pub struct AofWriter {
    tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Command { db, args } => write!(f, "Command(db={db}, argc={})", args.len()),
            Message::Close => f.write_str("Close"),
        }
    }
}

impl AofWriter {
    /// Open (or create) the log at `path` for appending.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!("AOF enabled: {}", path.display());

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(file, rx));
        Ok(AofWriter {
            tx,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        })
    }

    /// Queue a command executed against database `db`.
    pub fn log(&self, db: usize, args: &[Vec<u8>]) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let message = Message::Command {
            db,
            args: args.to_vec(),
        };
        if self.tx.send(message).is_err() {
            warn!("AOF writer is gone, dropping command");
        }
    }

    /// Stop accepting records. Everything queued so far is still written.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Close);
        }
    }

    /// Close and wait until the background task has flushed the file.
    pub async fn wait_closed(&self) {
        self.close();
        if let Some(task) = self.task.lock().await.take()
            && let Err(e) = task.await
        {
            warn!("AOF writer task failed: {e}");
        }
    }
}

async fn write_loop(mut file: tokio::fs::File, mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut current_db = None;
    let mut buf = Vec::new();
    while let Some(message) = rx.recv().await {
        let Message::Command { db, args } = message else {
            break;
        };
        buf.clear();
        if current_db != Some(db) {
            RespValue::multi_bulk(["SELECT".to_string(), db.to_string()]).write_to(&mut buf);
            current_db = Some(db);
        }
        RespValue::multi_bulk(args).write_to(&mut buf);
        if let Err(e) = file.write_all(&buf).await {
            warn!("AOF write failed: {e}");
            // Force a SELECT before the next record in case this one was torn.
            current_db = None;
        }
    }
    if let Err(e) = file.flush().await {
        warn!("AOF flush failed: {e}");
    }
    if let Err(e) = file.sync_all().await {
        warn!("AOF sync failed: {e}");
    }
}

/// Replay the log at `path` into `store`, returning the number of commands
/// applied. A missing file replays nothing; a truncated tail is ignored.
pub async fn replay(path: impl AsRef<Path>, store: &DataStore) -> io::Result<usize> {
    let path = path.as_ref();
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut buf = BytesMut::from(&content[..]);
    let mut db = 0usize;
    let mut count = 0usize;
    loop {
        let frame = match RespParser::decode(&mut buf) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if e.is_fatal() => {
                warn!("AOF replay stopped: {e}");
                break;
            }
            Err(e) => {
                warn!("skipping bad AOF record: {e}");
                continue;
            }
        };
        let Some(args) = frame.into_args().filter(|args| !args.is_empty()) else {
            continue;
        };

        if args[0].eq_ignore_ascii_case(b"select") {
            match args.get(1).and_then(|raw| std::str::from_utf8(raw).ok()?.parse().ok()) {
                Some(index) if index < store.num_dbs() => db = index,
                _ => warn!("ignoring bad SELECT in AOF"),
            }
            continue;
        }

        let reply = store.exec_on(db, &args);
        if let RespValue::Error(e) = &reply {
            warn!("AOF command failed during replay: {e}");
        }
        count += 1;
    }
    if !buf.is_empty() {
        warn!("ignoring {} trailing bytes in AOF", buf.len());
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientState;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "shardis-{name}-{}-{}.aof",
            std::process::id(),
            crate::store::now_millis()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn args(parts: &[&str]) -> Vec<Vec<u8>> {
        parts.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[tokio::test]
    async fn test_writes_select_on_db_change() {
        let path = temp_path("select");
        let writer = AofWriter::open(&path).await.unwrap();
        writer.log(0, &args(&["SET", "a", "1"]));
        writer.log(0, &args(&["SET", "b", "2"]));
        writer.log(3, &args(&["SET", "c", "3"]));
        writer.wait_closed().await;
        writer.log(0, &args(&["SET", "late", "x"]));

        let content = std::fs::read(&path).unwrap();
        let expected = b"*2\r\n$6\r\nSELECT\r\n$1\r\n0\r\n\
*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
*3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n\
*2\r\n$6\r\nSELECT\r\n$1\r\n3\r\n\
*3\r\n$3\r\nSET\r\n$1\r\nc\r\n$1\r\n3\r\n";
        assert_eq!(content, expected.to_vec());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_store_logs_writes_and_replays() {
        let path = temp_path("replay");
        let store = DataStore::new(16);
        store.attach_aof(AofWriter::open(&path).await.unwrap());

        let mut client = ClientState::new();
        store.exec(&mut client, &args(&["SET", "k", "v"]));
        store.exec(&mut client, &args(&["GET", "k"]));
        store.exec(&mut client, &args(&["LPUSH", "k", "x"]));
        store.exec(&mut client, &args(&["SELECT", "2"]));
        store.exec(&mut client, &args(&["ZADD", "z", "1", "a", "2", "b"]));
        store.exec(&mut client, &args(&["ZREM", "z", "a"]));
        store.close();
        if let Some(aof) = store.aof() {
            aof.wait_closed().await;
        }

        let restored = DataStore::new(16);
        // SET, ZADD and ZREM: the read and the failed LPUSH are not logged.
        assert_eq!(replay(&path, &restored).await.unwrap(), 3);
        assert_eq!(
            restored.exec_on(0, &args(&["GET", "k"])),
            RespValue::bulk_string("v")
        );
        assert_eq!(
            restored.exec_on(2, &args(&["ZRANGE", "z", "0", "-1"])),
            RespValue::multi_bulk(["b"])
        );
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_replay_in_applied_order() {
        let path = temp_path("order");
        let store = DataStore::new(16);
        store.attach_aof(AofWriter::open(&path).await.unwrap());

        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..200 {
                        let item = format!("{t}:{i}");
                        store.exec_on(0, &args(&["RPUSH", "l", &item]));
                        store.exec_on(0, &args(&["SET", "k", &item]));
                    }
                });
            }
        });
        store.close();
        if let Some(aof) = store.aof() {
            aof.wait_closed().await;
        }

        let restored = DataStore::new(16);
        assert_eq!(replay(&path, &restored).await.unwrap(), 8 * 200 * 2);
        for query in [&["GET", "k"][..], &["LRANGE", "l", "0", "-1"][..]] {
            assert_eq!(
                restored.exec_on(0, &args(query)),
                store.exec_on(0, &args(query))
            );
        }
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_replay_missing_file_and_truncated_tail() {
        let store = DataStore::new(16);
        assert_eq!(replay(temp_path("missing"), &store).await.unwrap(), 0);

        let path = temp_path("truncated");
        std::fs::write(&path, b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*3\r\n$3\r\nSET\r\n$1").unwrap();
        assert_eq!(replay(&path, &store).await.unwrap(), 1);
        assert_eq!(store.db(0).unwrap().len(), 1);
        let _ = std::fs::remove_file(&path);
    }
}
