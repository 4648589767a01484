//! File transfer over RDP streams.
//!
//! The server answers exactly one request per connection and then closes:
//!
//! ```text
//!  client                           server
//!    │ ── UP /name\n<bytes> ──────▶ │  write <storage>/name
//!    │ ◀──────────── OK /name\n ─── │
//!    │                              │
//!    │ ── DOWN /name ─────────────▶ │  read <storage>/name
//!    │ ◀─── OK /name\n<bytes> ───── │  (or ERR /name\n<reason>)
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;
use crate::error::RdpError;
use crate::listener::Listener;
use crate::message::{Message, MessageError, Method};
use crate::stream::Stream;

pub const FILE_NOT_FOUND: &str = "The file does not exist";
pub const SAVE_FAILED: &str = "There was a problem saving the file";
pub const INVALID_METHOD: &str = "Invalid request method";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Rdp(#[from] RdpError),

    #[error("bad message: {0}")]
    Message(#[from] MessageError),

    #[error("file error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with `ERR`.
    #[error("server refused: {0}")]
    Refused(String),

    #[error("unexpected {0} reply")]
    UnexpectedReply(Method),
}

/// Accept connections forever, one task per client.
///
/// Returns only when accepting fails, e.g. after the listener is closed.
pub async fn serve(mut listener: Listener, storage: PathBuf) -> Result<(), TransferError> {
    loop {
        let stream = listener.accept().await?;
        let storage = storage.clone();
        tokio::spawn(async move {
            let peer = stream.peer_addr().ok();
            match handle_client(stream, &storage).await {
                Ok(()) => {}
                Err(TransferError::Rdp(e)) if e.is_hangup() => {
                    log::debug!("client {peer:?} hung up: {e}")
                }
                Err(e) => log::warn!("client {peer:?}: {e}"),
            }
        });
    }
}

/// Answer one request on `stream`, then close it.
pub async fn handle_client(mut stream: Stream, storage: &Path) -> Result<(), TransferError> {
    let result = answer(&mut stream, storage).await;
    stream.close().await;
    result
}

async fn answer(stream: &mut Stream, storage: &Path) -> Result<(), TransferError> {
    let request = stream.recv().await?;
    let reply = match Message::decode(&request) {
        Ok(msg) => respond(msg, storage).await,
        Err(e) => {
            log::debug!("undecodable request: {e}");
            Message::error("/", INVALID_METHOD)
        }
    };
    log::info!("reply {reply}");
    stream.send(&reply.encode()).await?;
    Ok(())
}

async fn respond(msg: Message, storage: &Path) -> Message {
    log::info!("request {msg}");
    match msg.method {
        Method::Upload => {
            let saved = match file_in(storage, msg.name()) {
                Some(path) => save(storage, &path, &msg.data).await,
                None => Err(io::Error::from(io::ErrorKind::InvalidInput)),
            };
            match saved {
                Ok(()) => Message::ok(&msg.path, Vec::new()),
                Err(e) => {
                    log::warn!("saving {}: {e}", msg.path);
                    Message::error(&msg.path, SAVE_FAILED)
                }
            }
        }
        Method::Download => {
            let contents = match file_in(storage, msg.name()) {
                Some(path) => tokio::fs::read(path).await.ok(),
                None => None,
            };
            match contents {
                Some(data) => Message::ok(&msg.path, data),
                None => Message::error(&msg.path, FILE_NOT_FOUND),
            }
        }
        Method::Ok | Method::Error => Message::error(&msg.path, INVALID_METHOD),
    }
}

async fn save(storage: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    tokio::fs::create_dir_all(storage).await?;
    tokio::fs::write(path, data).await
}

/// `dir/name`, provided `name` is a bare file name.
fn file_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let file = Path::new(name).file_name()?;
    (file == name).then(|| dir.join(file))
}

/// Send `src/name` to the server at `server`.
pub async fn upload(
    server: SocketAddr,
    config: Config,
    src: &Path,
    name: &str,
) -> Result<(), TransferError> {
    let data = tokio::fs::read(src.join(name)).await?;
    let reply = exchange(server, config, Message::upload(name, data)).await?;
    match reply.method {
        Method::Ok => Ok(()),
        Method::Error => Err(TransferError::Refused(
            String::from_utf8_lossy(&reply.data).into_owned(),
        )),
        other => Err(TransferError::UnexpectedReply(other)),
    }
}

/// Fetch `name` from the server at `server` into `dst`, returning the path
/// written.
pub async fn download(
    server: SocketAddr,
    config: Config,
    dst: &Path,
    name: &str,
) -> Result<PathBuf, TransferError> {
    let reply = exchange(server, config, Message::download(name)).await?;
    match reply.method {
        Method::Ok => {
            let path = file_in(dst, reply.name())
                .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
            tokio::fs::create_dir_all(dst).await?;
            tokio::fs::write(&path, &reply.data).await?;
            Ok(path)
        }
        Method::Error => Err(TransferError::Refused(
            String::from_utf8_lossy(&reply.data).into_owned(),
        )),
        other => Err(TransferError::UnexpectedReply(other)),
    }
}

async fn exchange(
    server: SocketAddr,
    config: Config,
    request: Message,
) -> Result<Message, TransferError> {
    let mut stream = Stream::connect(server, config).await?;
    let reply = async {
        stream.send(&request.encode()).await?;
        stream.recv().await
    }
    .await;
    stream.close().await;
    Ok(Message::decode(&reply?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bare_names_map_into_storage() {
        let dir = Path::new("/srv/storage");
        assert_eq!(file_in(dir, "a.txt"), Some(dir.join("a.txt")));
        assert_eq!(file_in(dir, "../etc/passwd"), None);
        assert_eq!(file_in(dir, "sub/a.txt"), None);
        assert_eq!(file_in(dir, ""), None);
    }

    #[tokio::test]
    async fn download_of_missing_file_is_refused() {
        let storage = tempfile::tempdir().unwrap();
        let reply = respond(Message::download("nope"), storage.path()).await;
        assert_eq!(reply, Message::error("/nope", FILE_NOT_FOUND));
    }

    #[tokio::test]
    async fn upload_then_download_through_respond() {
        let storage = tempfile::tempdir().unwrap();
        let dir = storage.path().join("nested");

        let reply = respond(Message::upload("f.bin", vec![9; 10]), &dir).await;
        assert_eq!(reply, Message::ok("/f.bin", Vec::new()));

        let reply = respond(Message::download("f.bin"), &dir).await;
        assert_eq!(reply, Message::ok("/f.bin", vec![9; 10]));
    }

    #[tokio::test]
    async fn responses_are_not_requests() {
        let storage = tempfile::tempdir().unwrap();
        let reply = respond(Message::ok("x", Vec::new()), storage.path()).await;
        assert_eq!(reply, Message::error("/x", INVALID_METHOD));
    }
}
