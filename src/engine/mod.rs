//! This module provides the note storage engine. The one engine implemented is [`FsStore`],
//! which keeps one directory per user and one JSON file per note.
use crate::{Note, Result};

/// A trait for the operations a note storage engine offers to the request dispatcher.
///
/// Every operation reports a failure through its `Result`; the `Display` of the error is what
/// ends up in the response sent to the client.
pub trait NotesEngine: Clone + Send + 'static {
    /// stores a new note, creating the user namespace if needed
    ///
    /// # Errors
    ///
    /// Returns `NotesError::NoteExists` if the note is already stored. Nothing is written then.
    fn add(&self, note: Note) -> Result<()>;

    /// replaces a stored note with `note` and returns what was written.
    ///
    /// The user namespace is created if it does not exist, even if the update then fails.
    ///
    /// # Errors
    ///
    /// Returns `NotesError::NoteNotFound` if there is no note to replace.
    fn update(&self, note: Note) -> Result<Note>;

    /// removes a note. The user namespace is kept, even when it becomes empty.
    ///
    /// # Errors
    ///
    /// Returns `NotesError::UserNotFound` or `NotesError::NoteNotFound`.
    fn remove(&self, user: &str, title: &str) -> Result<()>;

    /// reads a single note
    ///
    /// # Errors
    ///
    /// Returns `NotesError::UserNotFound` or `NotesError::NoteNotFound`.
    fn read(&self, user: &str, title: &str) -> Result<Note>;

    /// returns every note of `user`, in no particular order
    ///
    /// # Errors
    ///
    /// Returns `NotesError::UserNotFound` if the user has no namespace.
    fn list(&self, user: &str) -> Result<Vec<Note>>;
}

mod fs;

pub use self::fs::FsStore;
