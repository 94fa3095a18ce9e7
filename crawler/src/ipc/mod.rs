//! Link to the address book.
//!
//! The address book hands out crawl targets and collects results over one
//! long lived TCP stream using the line protocol in [`protocol`]. The link
//! survives the address book restarting, either side noticing a broken stream
//! reconnects it.
//!
//! Each reconnect bumps a generation number. A side only reconnects if the
//! generation it saw fail is still current, so a reader and a writer failing
//! at the same time open one new stream between them.

mod protocol;

pub use protocol::{Command, LineBuffer, MalformedCommand, Report, MAX_LINE_LENGTH};

use crate::metrics::CrawlMetrics;
use chia_peers_connection::Peer;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Default address of the address book.
pub const DEFAULT_ADDRESS_BOOK: &str = "127.0.0.1:18445";
/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Default bound on opening a TCP stream to the address book.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Size of a single read from the address book.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Why [`forward_commands`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStreamEnd {
    /// The address book closed the stream.
    Eof,
    /// Nobody is taking crawl targets anymore.
    InboundClosed,
}

/// Read commands from `reader` and queue their targets on `commands`.
///
/// Blocks while `commands` is full, applying backpressure to the address
/// book. Malformed lines are logged, counted and skipped.
pub async fn forward_commands<R>(
    reader: &mut R,
    lines: &mut LineBuffer,
    commands: &mpsc::Sender<Peer>,
    metrics: &CrawlMetrics,
) -> io::Result<CommandStreamEnd>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok(CommandStreamEnd::Eof);
        }
        if !queue_commands(&chunk[..read], lines, commands, metrics).await {
            return Ok(CommandStreamEnd::InboundClosed);
        }
    }
}

/// Queue the targets of every line `chunk` completes.
///
/// Returns false once `commands` is closed.
async fn queue_commands(
    chunk: &[u8],
    lines: &mut LineBuffer,
    commands: &mpsc::Sender<Peer>,
    metrics: &CrawlMetrics,
) -> bool {
    for line in lines.push(chunk) {
        let parsed = match line {
            Ok(line) => Command::parse(&line).map_err(|e| {
                warn!(
                    "Dropping malformed command {:?}: {e}",
                    String::from_utf8_lossy(&line)
                );
            }),
            Err(e) => {
                warn!("Dropping malformed command: {e}");
                Err(())
            }
        };
        match parsed {
            Ok(Command::Crawl(peer)) => {
                debug!("Queueing crawl of {peer}");
                if commands.send(peer).await.is_err() {
                    return false;
                }
            }
            Err(()) => metrics.record_malformed_command(),
        }
    }
    true
}

#[derive(Debug)]
struct LinkState {
    generation: u64,
    /// None once a write failed, until the next reconnect.
    writer: Option<OwnedWriteHalf>,
}

#[derive(Debug)]
struct Shared {
    address: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    state: Mutex<LinkState>,
    /// Read halves of new streams, tagged with their generation.
    halves: mpsc::UnboundedSender<(u64, OwnedReadHalf)>,
}

impl Shared {
    /// Replace the stream if `seen` is still the current generation.
    async fn reconnect(&self, seen: u64) -> io::Result<()> {
        let mut state = self.state.lock().await;
        if state.generation != seen {
            debug!("Link to {} already replaced", self.address);
            return Ok(());
        }

        // The lock is held while connecting, so the wait is bounded.
        let stream = timeout(self.connect_timeout, TcpStream::connect(self.address.as_str()))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", self.address),
                )
            })??;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        state.generation += 1;
        state.writer = Some(writer);
        // The reader task owns the receiver and lives as long as the link.
        let _ = self.halves.send((state.generation, reader));
        info!(
            "Connected to address book at {} (generation {})",
            self.address, state.generation
        );
        Ok(())
    }

    /// Reconnect until it works.
    async fn restore(&self, seen: u64) {
        while let Err(e) = self.reconnect(seen).await {
            warn!(
                "Address book at {} unreachable, retrying in {:?}: {e}",
                self.address, self.reconnect_delay
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn write_line(&self, line: &str) -> Result<(), (u64, io::Error)> {
        let mut state = self.state.lock().await;
        let generation = state.generation;
        let result = match state.writer.as_mut() {
            Some(writer) => writer.write_all(line.as_bytes()).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "address book link is down",
            )),
        };
        if result.is_err() {
            state.writer = None;
        }
        result.map_err(|e| (generation, e))
    }
}

enum ReadEvent {
    Replaced(Option<(u64, OwnedReadHalf)>),
    Read(io::Result<usize>),
}

async fn read_loop(
    shared: Arc<Shared>,
    mut halves: mpsc::UnboundedReceiver<(u64, OwnedReadHalf)>,
    commands: mpsc::Sender<Peer>,
    metrics: Arc<CrawlMetrics>,
) {
    let mut current: Option<(u64, OwnedReadHalf)> = None;
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if current.is_none() {
            match halves.recv().await {
                Some(half) => {
                    current = Some(half);
                    lines.clear();
                }
                None => return,
            }
        }
        let Some((generation, reader)) = current.as_mut() else {
            continue;
        };
        let generation = *generation;

        // Only the read races a replacement. Queueing happens outside the
        // select so parsed targets are never dropped halfway.
        let event = tokio::select! {
            biased;
            half = halves.recv() => ReadEvent::Replaced(half),
            read = reader.read(&mut chunk) => ReadEvent::Read(read),
        };

        match event {
            ReadEvent::Replaced(Some(half)) => {
                debug!("Reading from address book generation {}", half.0);
                current = Some(half);
                lines.clear();
            }
            ReadEvent::Replaced(None) => return,
            ReadEvent::Read(Ok(0)) => {
                warn!("Address book closed the link");
                current = None;
                shared.restore(generation).await;
            }
            ReadEvent::Read(Ok(read)) => {
                if !queue_commands(&chunk[..read], &mut lines, &commands, &metrics).await {
                    debug!("Crawl queue closed, no longer reading commands");
                    return;
                }
            }
            ReadEvent::Read(Err(e)) => {
                warn!("Failed reading from address book: {e}");
                current = None;
                shared.restore(generation).await;
            }
        }
    }
}

/// Reconnecting link to the address book.
///
/// Commands read from the link are queued on the sender given to
/// [`AddressBookLink::connect`]. Dropping the link stops reading.
#[derive(Debug)]
pub struct AddressBookLink {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl AddressBookLink {
    /// Connect to the address book at `address`.
    ///
    /// # Arguments
    ///
    /// * `address` - Where the address book listens, e.g. [`DEFAULT_ADDRESS_BOOK`].
    /// * `reconnect_delay` - Pause between reconnect attempts after the link breaks.
    /// * `connect_timeout` - Bound on each TCP connect, e.g. [`DEFAULT_CONNECT_TIMEOUT`].
    /// * `commands` - Queue receiving crawl targets.
    /// * `metrics` - Counts malformed commands.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - Once the first connection is up.
    /// * `Err(io::Error)` - If the address book could not be reached.
    pub async fn connect(
        address: impl Into<String>,
        reconnect_delay: Duration,
        connect_timeout: Duration,
        commands: mpsc::Sender<Peer>,
        metrics: Arc<CrawlMetrics>,
    ) -> io::Result<Self> {
        let (halves_tx, halves_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            address: address.into(),
            reconnect_delay,
            connect_timeout,
            state: Mutex::new(LinkState {
                generation: 0,
                writer: None,
            }),
            halves: halves_tx,
        });
        shared.reconnect(0).await?;

        let reader = tokio::spawn(read_loop(shared.clone(), halves_rx, commands, metrics));
        Ok(Self { shared, reader })
    }

    /// Write a line, reconnecting and retrying once if the link is broken.
    pub async fn send(&self, line: &str) -> io::Result<()> {
        let seen = match self.shared.write_line(line).await {
            Ok(()) => return Ok(()),
            Err((seen, e)) => {
                warn!("Failed writing to address book, reconnecting: {e}");
                seen
            }
        };

        self.shared.reconnect(seen).await?;
        self.shared.write_line(line).await.map_err(|(_, e)| e)
    }

    /// Send a report, see [`AddressBookLink::send`].
    pub async fn report(&self, report: &Report) -> io::Result<()> {
        self.send(&report.to_line()).await
    }

    /// Number of times the link has been (re)established.
    pub async fn generation(&self) -> u64 {
        self.shared.state.lock().await.generation
    }
}

impl Drop for AddressBookLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
