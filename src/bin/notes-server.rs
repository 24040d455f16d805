//! this binary starts the notes server
//! to see the list of options, type: `notes-server --help`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use clap::{arg_enum, crate_version, value_t, App, Arg};
use notes::{
    FsStore, NaiveThreadPool, NotesError, NotesServer, RayonThreadPool, Result,
    SharedQueueThreadPool, ThreadPool,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        naive,
        shared,
        rayon
    }
}

const DEFAULT_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_DB_DIR: &str = "./db";
const DEFAULT_THREADS: &str = "4";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    addr: SocketAddr,
    db_dir: PathBuf,
    pool: Pool,
    threads: u32,
    /// stop the server after this long, run until killed if `None`
    timeout: Option<Duration>,
}

impl Opt {
    /// validates the command line parameters
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`NotesError::Parsing`] if one of the parameters is invalid
    ///
    fn build(addr: &str, db_dir: &str, pool: Pool, threads: &str, timeout: Option<&str>) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| NotesError::Parsing(format!("could not parse {} into an IP address and port", &addr)))?;
        let threads = match threads.parse::<u32>() {
            Ok(threads) if threads > 0 => threads,
            _ => return Err(NotesError::Parsing(format!("threads must be a positive integer, got {}", threads))),
        };
        let timeout = timeout
            .map(|ms| {
                ms.parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| NotesError::Parsing(format!("could not parse {} into milliseconds", ms)))
            })
            .transpose()?;

        Ok(Opt {
            addr,
            db_dir: PathBuf::from(db_dir),
            pool,
            threads,
            timeout,
        })
    }
}

fn main() {
    let matches = App::new("notes-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a multi-threaded note-storage server")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("db")
            .long("db")
            .value_name("DIR")
            .help("sets the directory the notes are stored in")
            .default_value(DEFAULT_DB_DIR))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .help("sets the thread pool carrying out requests")
            .possible_values(&Pool::variants())
            .default_value("naive"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("sets the number of threads of the 'shared' and 'rayon' pools")
            .default_value(DEFAULT_THREADS))
        .arg(Arg::with_name("timeout")
            .long("timeout")
            .short("t")
            .value_name("MS")
            .help("stops the server after MS milliseconds"))
        .arg(Arg::with_name("log-level")
            .long("log-level")
            .value_name("LEVEL")
            .help("sets the level of the log written to STDERR")
            .possible_values(&["error", "warn", "info", "debug", "trace"])
            .default_value("info"))
        .get_matches();

    // set up a tracing subscriber to log to STDERR
    let level = matches
        .value_of("log-level")
        .and_then(|level| Level::from_str(level).ok())
        .unwrap_or(Level::INFO);
    subscriber_config(level);

    // validate command line options, store them in Opt
    let pool = value_t!(matches, "pool", Pool).unwrap_or(Pool::naive);
    let opt = Opt::build(
        matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS),
        matches.value_of("db").unwrap_or(DEFAULT_DB_DIR),
        pool,
        matches.value_of("threads").unwrap_or(DEFAULT_THREADS),
        matches.value_of("timeout"),
    );
    let opt = match opt {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("notes-server {}", env!("CARGO_PKG_VERSION"));
    info!("Thread pool: {} ({} threads)", opt.pool, opt.threads);

    let engine = FsStore::open(&opt.db_dir)?;
    match opt.pool {
        Pool::naive => run_with_pool(engine, NaiveThreadPool::new(opt.threads)?, &opt),
        Pool::shared => run_with_pool(engine, SharedQueueThreadPool::new(opt.threads)?, &opt),
        Pool::rayon => run_with_pool(engine, RayonThreadPool::new(opt.threads)?, &opt),
    }
}

fn run_with_pool<P: ThreadPool + Send + Sync + 'static>(engine: FsStore, pool: P, opt: &Opt) -> Result<()> {
    let server = NotesServer::new(engine, pool);
    match opt.timeout {
        None => server.run(opt.addr),
        Some(timeout) => {
            info!("Server timeout set to {:?}", timeout);
            let handle = server.start(opt.addr)?;
            thread::sleep(timeout);
            handle.stop()
        }
    }
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // all spans/events with a level at least as severe as `level` will be written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
