use std::io;
use thiserror::Error;

/// type alias for all operations on the notes store, server and client that could fail with
/// a [`NotesError`]
pub type Result<T> = std::result::Result<T, NotesError>;

/// The Error variants used throughout the crate.
///
/// The `Display` text of a variant is exactly what a server puts in the `error` field of a
/// failed [`Response`](crate::Response), so the fixed vocabulary lives here.
#[derive(Error, Debug)]
pub enum NotesError {
    /// variant for errors caused from file or socket IO. Displays the underlying message.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// a note file or a message could not be (de)serialized
    #[error("{0}")]
    Serde(#[from] serde_json::Error),

    /// the user namespace (directory) does not exist
    #[error("User does not exist")]
    UserNotFound,

    /// the note file does not exist within an existing user namespace
    #[error("Note does not exist")]
    NoteNotFound,

    /// an `add` targeted a (user, title) that is already stored
    #[error("Note already exists")]
    NoteExists,

    /// a request lacked one of the fields its kind requires
    #[error("Missing parameters")]
    MissingParameters,

    /// the message had no recognizable `type`
    #[error("Unknown request")]
    UnknownRequest,

    /// an option or argument could not be parsed
    #[error("{0}")]
    Parsing(String),

    /// an error message reported back by the server
    #[error("{0}")]
    StringErr(String),

    /// a response did not hold what its request kind promises
    #[error("protocol error: {0}")]
    Protocol(String),
}
