use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;
use tracing::debug;

use crate::command::{Request, Response, ResponseKind};
use crate::{Note, NotesError, Result};

/// `NotesClient` contains the functionality for communication with a
/// [`NotesServer`](crate::NotesServer).
///
/// A client is one session: every request is sent on the same connection and is answered by
/// exactly one response, read back before the next request is sent.
pub struct NotesClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl NotesClient {
    /// creates a client and establishes a socket connection to the server at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(NotesClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// bounds how long a single read or write on the connection may block.
    /// `None` waits forever, the default.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let tcp = self.writer.get_ref();
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)?;
        Ok(())
    }

    /// sends `req` to the server and returns the server's response to it, whether or not the
    /// request succeeded.
    ///
    /// # Errors
    /// returns an error if the connection failed or the response could not be decoded
    pub fn send(&mut self, req: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, req)?;
        self.writer.flush()?;
        debug!("Request sent: {:?}", req);

        let resp = Response::deserialize(&mut self.reader)?;
        debug!("Response received: {:?}", resp);
        Ok(resp)
    }

    /// adds a new note
    /// # Errors
    /// `Err<NotesError::StringErr>` with the server's message if the note could not be added,
    /// e.g. "Note already exists"
    pub fn add(&mut self, note: Note) -> Result<()> {
        self.request(Request::add(note)).map(|_| ())
    }

    /// replaces an existing note, returns the note as stored by the server
    /// # Errors
    /// `Err<NotesError::StringErr>` if the note could not be updated, e.g. "Note does not exist"
    pub fn update(&mut self, note: Note) -> Result<Note> {
        let notes = self.request(Request::update(note))?;
        single_note(notes)
    }

    /// removes the note `title` of `user`
    /// # Errors
    /// `Err<NotesError::StringErr>` if the note could not be removed
    pub fn remove(&mut self, user: &str, title: &str) -> Result<()> {
        self.request(Request::Remove {
            user: user.to_owned(),
            title: title.to_owned(),
        })
        .map(|_| ())
    }

    /// reads the note `title` of `user`
    /// # Errors
    /// `Err<NotesError::StringErr>` if the note could not be read
    pub fn read(&mut self, user: &str, title: &str) -> Result<Note> {
        let notes = self.request(Request::Read {
            user: user.to_owned(),
            title: title.to_owned(),
        })?;
        single_note(notes)
    }

    /// lists every note of `user`
    /// # Errors
    /// `Err<NotesError::StringErr>` if the notes could not be listed, e.g. "User does not exist"
    pub fn list(&mut self, user: &str) -> Result<Vec<Note>> {
        let notes = self.request(Request::List { user: user.to_owned() })?;
        notes.ok_or_else(|| NotesError::Protocol("list response without notes".into()))
    }

    /// ends the session, the server sees the connection close
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }

    /// sends `req`, checks that the response answers it and turns a failure into an error.
    /// Returns the notes of a successful response.
    fn request(&mut self, req: Request) -> Result<Option<Vec<Note>>> {
        let kind = req.kind();
        let resp = self.send(&req)?;
        if !resp.answers(kind) {
            return Err(unexpected(kind, &resp));
        }
        if resp.success {
            Ok(resp.notes)
        } else {
            // re-throwing the server's error here
            Err(NotesError::StringErr(resp.error.unwrap_or_default()))
        }
    }
}

fn unexpected(kind: ResponseKind, resp: &Response) -> NotesError {
    match (&resp.kind, &resp.error) {
        (ResponseKind::Unknown, Some(error)) => NotesError::StringErr(error.clone()),
        _ => NotesError::Protocol(format!("{:?} request answered by {:?}", kind, resp.kind)),
    }
}

fn single_note(notes: Option<Vec<Note>>) -> Result<Note> {
    notes
        .and_then(|notes| notes.into_iter().next())
        .ok_or_else(|| NotesError::Protocol("response without a note".into()))
}
