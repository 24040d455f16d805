//! The notes-client executable supports the following command line arguments:
//!
//! `notes-client add --user <USER> --title <TITLE> --body <BODY> --color <COLOR> [--addr IP-PORT]`
//!
//!     Add a new note. COLOR is one of red, green, blue or yellow.
//!
//! `notes-client update --user <USER> --title <TITLE> --body <BODY> --color <COLOR> [--addr IP-PORT]`
//!
//!     Replace the body and color of an existing note.
//!
//! `notes-client remove --user <USER> --title <TITLE> [--addr IP-PORT]`
//!
//!     Remove a note.
//!
//! `notes-client read --user <USER> --title <TITLE> [--addr IP-PORT]`
//!
//!     Print a note.
//!
//! `notes-client list --user <USER> [--addr IP-PORT]`
//!
//!     Print the titles of every note of a user.
//!
//! --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT.
//! If --addr is not specified then connect on 127.0.0.1:3000.
//! Print an error and return a non-zero exit code on server error, or if IP-PORT does not
//! parse as an address.
//!
//! `notes-client -V`
//!
//!     Print the version.

use std::net::SocketAddr;
use std::process::exit;
use std::str::FromStr;

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use notes::{Color, Note, NotesClient, NotesError, Request, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:3000";

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    req: Request,
}

impl Opt {
    fn new(addr: SocketAddr, req: Request) -> Self {
        Self { addr, req }
    }

    /// validates the `addr` parameter is a valid IP address and PORT
    /// returns `Ok<Opt>` if everything is valid
    /// # Errors
    /// returns [`NotesError::Parsing`] if one of the parameters is invalid
    ///
    fn build(addr: &str, req: Request) -> Result<Opt> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| NotesError::Parsing(format!("could not parse {} into an IP address and port", &addr)))?;

        Ok(Opt::new(addr, req))
    }
}

fn main() {
    let user = || Arg::with_name("user")
        .long("user")
        .short("u")
        .value_name("USER")
        .help("The user")
        .required(true);
    let title = || Arg::with_name("title")
        .long("title")
        .short("t")
        .value_name("TITLE")
        .help("The title")
        .required(true);
    let body = || Arg::with_name("body")
        .long("body")
        .short("b")
        .value_name("BODY")
        .help("The body")
        .required(true);
    let color = || Arg::with_name("color")
        .long("color")
        .short("c")
        .value_name("COLOR")
        .help("The color")
        .possible_values(&Color::NAMES)
        .required(true);

    let matches = App::new("notes-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client of the note-storage server")
        .subcommands(vec![
            SubCommand::with_name("add")
                .about("Add a note")
                .args(&[user(), title(), body(), color()]),
            SubCommand::with_name("update")
                .about("Update a note")
                .args(&[user(), title(), body(), color()]),
            SubCommand::with_name("remove")
                .about("Remove a note")
                .args(&[user(), title()]),
            SubCommand::with_name("read")
                .about("Read a note")
                .args(&[user(), title()]),
            SubCommand::with_name("list")
                .about("List the notes of a user")
                .arg(user()),
        ])
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT of the server to connect to")
            .default_value(DEFAULT_ADDRESS))
        .arg(Arg::with_name("log-level")
            .long("log-level")
            .value_name("LEVEL")
            .help("sets the level of the log written to STDERR")
            .possible_values(&["error", "warn", "info", "debug", "trace"])
            .default_value("warn"))
        .get_matches();

    // configure a subscriber that will log messages to STDERR
    let level = matches
        .value_of("log-level")
        .and_then(|level| Level::from_str(level).ok())
        .unwrap_or(Level::WARN);
    subscriber_config(level);

    // parse commands into an Opt struct, then run it
    if let Err(e) = parse_options(&matches).and_then(run) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the specified request on a [`NotesClient`] and prints its outcome
/// `opt` contains the server address and the request to execute
fn run(opt: Opt) -> Result<()> {
    let mut client = NotesClient::connect(opt.addr)?;
    match opt.req {
        Request::Add { user, title, body, color } => {
            client.add(Note::new(user, title.as_str(), body, color))?;
            println!("Note added: {}", title);
        }
        Request::Update { user, title, body, color } => {
            let note = client.update(Note::new(user, title, body, color))?;
            println!("Note updated: {}", note.title);
        }
        Request::Remove { user, title } => {
            client.remove(&user, &title)?;
            println!("Note removed: {}", title);
        }
        Request::Read { user, title } => {
            let note = client.read(&user, &title)?;
            println!("User: {}", note.user);
            println!("Title: {}", note.title);
            println!("Body: {}", note.body);
            println!("Color: {}", note.color);
        }
        Request::List { user } => {
            let notes = client.list(&user)?;
            if notes.is_empty() {
                println!("No notes found");
            } else {
                println!("User: {}", user);
                for note in notes {
                    println!("\t{}", note.title);
                }
            }
        }
    }
    client.close()
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let addr = matches.value_of("addr").unwrap_or(DEFAULT_ADDRESS);
    let value = |args: &ArgMatches, name: &str| -> Result<String> {
        args.value_of(name)
            .map(String::from)
            .ok_or_else(|| NotesError::Parsing(format!("missing argument: {}", name)))
    };
    let note = |args: &ArgMatches| -> Result<Note> {
        Ok(Note::new(
            value(args, "user")?,
            value(args, "title")?,
            value(args, "body")?,
            value(args, "color")?.parse::<Color>()?,
        ))
    };

    let req = match matches.subcommand() {
        ("add", Some(args)) => Request::add(note(args)?),
        ("update", Some(args)) => Request::update(note(args)?),
        ("remove", Some(args)) => Request::Remove {
            user: value(args, "user")?,
            title: value(args, "title")?,
        },
        ("read", Some(args)) => Request::Read {
            user: value(args, "user")?,
            title: value(args, "title")?,
        },
        ("list", Some(args)) => Request::List { user: value(args, "user")? },
        _ => return Err(NotesError::Parsing("a command is required, see --help".into())),
    };
    Opt::build(addr, req)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
