use std::io::{self, BufWriter, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::command::Response;
use crate::thread_pool::{NaiveThreadPool, ThreadPool};
use crate::{Dispatcher, Framer, FsStore, NotesEngine, NotesError, Result};

// size of the buffer each session reads the socket into
const READ_CHUNK: usize = 4 * 1024;

/// A TCP socket server implementation over a note storage engine.
/// It listens for incoming connections on a [`SocketAddr`](std::net::SocketAddr) and reads
/// each connection on a session thread of its own. The requests framed by a session are
/// carried out on a thread of the [`ThreadPool`], so an idle connection never holds a pool
/// thread and never delays the acceptance of another one.
///
/// A session is persistent: after a response is written the server keeps reading from the same
/// connection, until the client closes it. Messages are framed by a [`Framer`] and answered one
/// at a time, in order, with exactly one response each.
///
/// # Example
/// Start a server on an ephemeral port, storing notes in `./db`, with a thread per connection
/// ```rust
/// use std::path::Path;
/// use notes::{FsStore, NotesServer};
/// use notes::thread_pool::{NaiveThreadPool, ThreadPool};
/// # fn main() -> notes::Result<()> {
/// let engine = FsStore::open(Path::new("./db"))?;
/// let server = NotesServer::new(engine, NaiveThreadPool::new(0)?);
/// let handle = server.start("127.0.0.1:0")?;
/// println!("listening on {}", handle.local_addr());
/// handle.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct NotesServer<E: NotesEngine, P: ThreadPool> {
    /// the engine the requests are carried out against
    engine: E,
    /// a pool of threads that will carry out the requests
    pool: P,
}

impl<E: NotesEngine, P: ThreadPool + Send + Sync + 'static> NotesServer<E, P> {
    /// Create a new `NotesServer` using the given [`NotesEngine`] and [`ThreadPool`]
    /// implementation.
    pub fn new(engine: E, pool: P) -> Self {
        NotesServer { engine, pool }
    }

    /// starts a server listening on the given address and blocks the calling thread while
    /// serving it.
    ///
    /// # Errors
    /// returns [`NotesError`] if the server could not be started
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!("Listening on {}", listener.local_addr()?);
        self.accept_loop(listener, &AtomicBool::new(false));
        Ok(())
    }

    /// binds the given address and serves it from a background thread.
    /// The returned [`ServerHandle`] stops the server.
    ///
    /// # Errors
    /// returns [`NotesError`] if the address could not be bound
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let acceptor = thread::Builder::new()
            .name("notes-acceptor".into())
            .spawn(move || self.accept_loop(listener, &flag))?;

        Ok(ServerHandle {
            local_addr,
            shutdown,
            acceptor: Some(acceptor),
        })
    }

    /// accepts connections until `shutdown` is raised, starting a session thread for each one
    fn accept_loop(self, listener: TcpListener, shutdown: &AtomicBool) {
        let dispatcher = Dispatcher::new(self.engine);
        let pool = Arc::new(self.pool);
        for stream in listener.incoming() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let dispatcher = dispatcher.clone();
                    let pool = Arc::clone(&pool);
                    let session = thread::Builder::new()
                        .name("notes-session".into())
                        .spawn(move || {
                            if let Err(e) = serve(dispatcher, pool.as_ref(), stream) {
                                error!("Error on serving client: {}", e);
                            }
                        });
                    if let Err(e) = session {
                        error!("Failed to spawn a session thread: {}", e);
                    }
                }
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        info!("Stopped accepting connections");
    }
}

/// Starts a note server listening on every interface at `port` (0 picks a free port), keeping
/// its notes under `db_dir`, which is created if missing. Each request gets its own thread.
///
/// # Errors
/// returns [`NotesError`] if `db_dir` could not be created or the port could not be bound
pub fn start<P: AsRef<Path>>(port: u16, db_dir: P) -> Result<ServerHandle> {
    let engine = FsStore::open(db_dir.as_ref())?;
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    NotesServer::new(engine, NaiveThreadPool::new(0)?).start(addr)
}

/// Handle to a server started in the background. Dropping it stops the server too.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// the address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// an address a local client can connect to. Same as [`local_addr`](Self::local_addr),
    /// except that an unspecified ip (`0.0.0.0` or `::`) is replaced by loopback.
    pub fn connect_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        addr
    }

    /// stops accepting new connections and waits for the accepting thread to end.
    /// Sessions already open keep being served until their client disconnects.
    ///
    /// # Errors
    /// returns [`NotesError`] if the accepting thread panicked
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let acceptor = match self.acceptor.take() {
            Some(acceptor) => acceptor,
            None => return Ok(()),
        };
        self.shutdown.store(true, Ordering::SeqCst);
        // the acceptor is blocked in accept(), a connection wakes it up to see the flag
        if let Err(e) = TcpStream::connect(self.connect_addr()) {
            debug!("wake up connection failed: {}", e);
        }
        acceptor
            .join()
            .map_err(|_| NotesError::StringErr("the acceptor thread panicked".into()))?;
        info!("Server on {} stopped", self.local_addr);
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error stopping server: {}", e);
        }
    }
}

/// Serves one session on the given `tcp` stream.
/// This function will: read the stream in chunks, frame complete messages, dispatch each of
/// them on the `pool` and write its [`Response`] back, until the client closes the connection.
/// An incomplete message left when the client disconnects is dropped.
fn serve<E: NotesEngine, P: ThreadPool>(
    dispatcher: Dispatcher<E>,
    pool: &P,
    tcp: TcpStream,
) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    debug!("Client connected: {}", peer_addr);
    let mut stream_reader = &tcp;
    let mut stream_writer = BufWriter::new(&tcp);

    let mut send_resp = move |resp: Response| -> Result<()> {
        serde_json::to_writer(&mut stream_writer, &resp)?;
        stream_writer.flush()?;
        debug!("Response sent to {}: {:?}", peer_addr, resp);
        Ok(())
    };

    let mut framer = Framer::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let len = match stream_reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        framer.push(&chunk[..len]);

        for message in framer.frames() {
            debug!("Receive request from {}: {:?}", peer_addr, message);
            let resp = dispatch_on(pool, &dispatcher, message)?;
            if !resp.success {
                debug!("Request from {} failed: {:?}", peer_addr, resp.error);
            }
            send_resp(resp)?;
        }
    }

    framer.finish();
    debug!("Client disconnected: {}", peer_addr);
    Ok(())
}

/// runs one dispatch on a thread of `pool` and waits for its response, so a session has at
/// most one request in flight
fn dispatch_on<E: NotesEngine, P: ThreadPool>(
    pool: &P,
    dispatcher: &Dispatcher<E>,
    message: serde_json::Result<Value>,
) -> Result<Response> {
    let (tx, rx) = channel::bounded(1);
    let dispatcher = dispatcher.clone();
    pool.spawn(move || {
        if tx.send(dispatcher.dispatch(message)).is_err() {
            debug!("session ended before its response was ready");
        }
    });
    rx.recv()
        .map_err(|_| NotesError::StringErr("the request was dropped by the thread pool".into()))
}
