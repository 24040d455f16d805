use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use super::NotesEngine;
use crate::error::{NotesError, Result};
use crate::Note;

// suffix of every note file
const NOTE_EXTENSION: &str = "json";

/// A [`NotesEngine`] that keeps notes on the local file system.
///
/// The layout below the root directory (the "db dir") is one sub-directory per user and one
/// `<title>.json` file per note, holding the JSON serialized [`Note`]. A note file is written
/// with a plain overwrite, so a crash during a write can leave a truncated file behind.
///
/// A user or title is a single path component: names holding a path separator, a NUL byte,
/// or being `.` or `..` are rejected with an [`io::ErrorKind::InvalidInput`] error, so nothing
/// is ever read or written outside the root.
///
/// Cloning a `FsStore` is cheap, all clones share the same root and the same locks.
#[derive(Debug, Clone)]
pub struct FsStore {
    // the db dir
    root: Arc<PathBuf>,
    // serializes operations on the same (user, title) across connections
    locks: Arc<KeyLocks>,
}

impl FsStore {
    /// creates a [`FsStore`] keeping its data under `root`.
    /// If the `root` directory does not exist it will be created.
    #[instrument]
    pub fn open(root: &Path) -> Result<FsStore> {
        fs::create_dir_all(root)?;
        info!("notes are stored in {:?}", root);

        Ok(FsStore {
            root: Arc::new(root.to_path_buf()),
            locks: Arc::new(KeyLocks::default()),
        })
    }

    /// the directory holding every user namespace
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user: &str) -> Result<PathBuf> {
        Ok(self.root.join(path_component(user)?))
    }

    fn note_path(&self, user: &str, title: &str) -> Result<PathBuf> {
        let title = path_component(title)?;
        Ok(self.user_dir(user)?.join(format!("{}.{}", title, NOTE_EXTENSION)))
    }

    /// checks that both the namespace of `user` and the note exist, returns the note's path
    fn existing_note(&self, user: &str, title: &str) -> Result<PathBuf> {
        if !self.user_dir(user)?.is_dir() {
            return Err(NotesError::UserNotFound);
        }
        let path = self.note_path(user, title)?;
        if !path.is_file() {
            return Err(NotesError::NoteNotFound);
        }
        Ok(path)
    }
}

impl NotesEngine for FsStore {
    #[instrument(skip(self, note), fields(user = %note.user, title = %note.title))]
    fn add(&self, note: Note) -> Result<()> {
        let path = self.note_path(&note.user, &note.title)?;
        self.locks.with_lock(&note.user, &note.title, || {
            fs::create_dir_all(self.user_dir(&note.user)?)?;
            if path.exists() {
                return Err(NotesError::NoteExists);
            }
            write_note(&path, &note)?;
            debug!("note added");
            Ok(())
        })
    }

    #[instrument(skip(self, note), fields(user = %note.user, title = %note.title))]
    fn update(&self, note: Note) -> Result<Note> {
        let path = self.note_path(&note.user, &note.title)?;
        self.locks.with_lock(&note.user, &note.title, || {
            fs::create_dir_all(self.user_dir(&note.user)?)?;
            if !path.is_file() {
                return Err(NotesError::NoteNotFound);
            }
            write_note(&path, &note)?;
            debug!("note updated");
            Ok(())
        })?;
        Ok(note)
    }

    #[instrument(skip(self))]
    fn remove(&self, user: &str, title: &str) -> Result<()> {
        self.locks.with_lock(user, title, || {
            let path = self.existing_note(user, title)?;
            fs::remove_file(path)?;
            debug!("note removed");
            Ok(())
        })
    }

    #[instrument(skip(self))]
    fn read(&self, user: &str, title: &str) -> Result<Note> {
        self.locks.with_lock(user, title, || {
            let path = self.existing_note(user, title)?;
            read_note(&path)
        })
    }

    #[instrument(skip(self))]
    fn list(&self, user: &str) -> Result<Vec<Note>> {
        let user_dir = self.user_dir(user)?;
        if !user_dir.is_dir() {
            return Err(NotesError::UserNotFound);
        }

        let mut notes = vec![];
        for entry in fs::read_dir(&user_dir)? {
            let path = entry?.path();
            if path.is_file()
                && path
                    .extension()
                    .map_or(false, |ext| ext.to_str() == Some(NOTE_EXTENSION))
            {
                notes.push(read_note(&path)?);
            }
        }
        debug!(count = notes.len(), "notes listed");
        Ok(notes)
    }
}

/// returns `name` if it can be used as one path component below the root
fn path_component(name: &str) -> Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        let msg = format!("invalid name: {:?}", name);
        return Err(io::Error::new(io::ErrorKind::InvalidInput, msg).into());
    }
    Ok(name)
}

/// serializes `note` over whatever is at `path`
fn write_note(path: &Path, note: &Note) -> Result<()> {
    fs::write(path, serde_json::to_vec(note)?)?;
    Ok(())
}

fn read_note(path: &Path) -> Result<Note> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// One mutex per (user, title) key in use. An entry is created by the first operation on a
/// key and removed by the last one still holding it.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl KeyLocks {
    /// runs `op` while holding the lock of (`user`, `title`)
    fn with_lock<T>(&self, user: &str, title: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let key = (user.to_owned(), title.to_owned());
        let result = {
            // the shard lock of the map must be released before the key lock is taken
            let key_lock = Arc::clone(
                self.locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .value(),
            );
            let _guard = key_lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        // only the map holds the lock now, nobody else is waiting for it
        self.locks
            .remove_if(&key, |_, key_lock| Arc::strong_count(key_lock) == 1);
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsStore) {
        let dir = TempDir::new().expect("unable to create temporary working directory");
        let store = FsStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("db");
        let store = FsStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn added_note_reads_back_equal() {
        let (dir, store) = store();
        let note = Note::new("u1", "t1", "b", Color::Red);
        store.add(note.clone()).unwrap();

        assert_eq!(store.read("u1", "t1").unwrap(), note);
        assert!(dir.path().join("u1").join("t1.json").is_file());
    }

    #[test]
    fn second_add_fails_and_keeps_first_note() {
        let (_dir, store) = store();
        let first = Note::new("u1", "t1", "first", Color::Red);
        store.add(first.clone()).unwrap();

        let err = store.add(Note::new("u1", "t1", "second", Color::Blue)).unwrap_err();
        assert_eq!(err.to_string(), "Note already exists");
        assert_eq!(store.read("u1", "t1").unwrap(), first);
    }

    #[test]
    fn update_replaces_the_whole_note() {
        let (_dir, store) = store();
        store.add(Note::new("u1", "t1", "old body", Color::Red)).unwrap();

        let new = Note::new("u1", "t1", "new body", Color::Green);
        assert_eq!(store.update(new.clone()).unwrap(), new);
        assert_eq!(store.read("u1", "t1").unwrap(), new);
    }

    #[test]
    fn update_of_missing_note_fails_but_creates_namespace() {
        let (dir, store) = store();
        let err = store.update(Note::new("u2", "t1", "b", Color::Red)).unwrap_err();
        assert!(matches!(err, NotesError::NoteNotFound));
        assert!(dir.path().join("u2").is_dir());
        assert!(store.list("u2").unwrap().is_empty());
    }

    #[test]
    fn remove_keeps_the_user_namespace() {
        let (dir, store) = store();
        store.add(Note::new("u1", "t1", "b", Color::Red)).unwrap();
        store.remove("u1", "t1").unwrap();

        assert!(dir.path().join("u1").is_dir());
        assert!(matches!(store.read("u1", "t1"), Err(NotesError::NoteNotFound)));
        assert!(store.list("u1").unwrap().is_empty());
    }

    #[test]
    fn missing_user_and_missing_note_are_told_apart() {
        let (_dir, store) = store();
        assert!(matches!(store.read("nobody", "t"), Err(NotesError::UserNotFound)));
        assert!(matches!(store.remove("nobody", "t"), Err(NotesError::UserNotFound)));
        assert!(matches!(store.list("nobody"), Err(NotesError::UserNotFound)));

        store.add(Note::new("u1", "t1", "b", Color::Red)).unwrap();
        assert!(matches!(store.read("u1", "t2"), Err(NotesError::NoteNotFound)));
        assert!(matches!(store.remove("u1", "t2"), Err(NotesError::NoteNotFound)));
    }

    #[test]
    fn list_returns_every_note_of_the_user() {
        let (_dir, store) = store();
        for title in &["A", "B", "C"] {
            store.add(Note::new("u1", *title, "b", Color::Yellow)).unwrap();
        }
        store.add(Note::new("u2", "D", "b", Color::Yellow)).unwrap();

        let mut notes = store.list("u1").unwrap();
        notes.sort_by(|a, b| a.title.cmp(&b.title));
        let titles: Vec<_> = notes.iter().map(|note| note.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert!(notes.iter().all(|note| note.user == "u1"));
    }

    #[test]
    fn corrupted_note_file_surfaces_a_decode_error() {
        let (dir, store) = store();
        store.add(Note::new("u1", "t1", "b", Color::Red)).unwrap();
        fs::write(dir.path().join("u1").join("t1.json"), b"{\"user\":").unwrap();

        assert!(matches!(store.read("u1", "t1"), Err(NotesError::Serde(_))));
        assert!(matches!(store.list("u1"), Err(NotesError::Serde(_))));
    }

    #[test]
    fn key_locks_are_released_after_each_operation() {
        let (_dir, store) = store();
        for i in 0..100 {
            let title = format!("t{}", i);
            assert!(store.read("nobody", &title).is_err());
            assert!(store.remove("nobody", &title).is_err());
        }
        store.add(Note::new("u1", "t1", "b", Color::Red)).unwrap();
        store.update(Note::new("u1", "t1", "c", Color::Blue)).unwrap();
        store.read("u1", "t1").unwrap();
        store.remove("u1", "t1").unwrap();

        assert_eq!(store.locks.len(), 0);
    }

    #[test]
    fn names_escaping_the_root_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(&dir.path().join("db")).unwrap();

        for (user, title) in &[("../x", "t"), ("u", "../../t"), ("..", "t"), ("u/v", "t"), ("u", "a\\b")] {
            let err = store.add(Note::new(*user, *title, "b", Color::Red)).unwrap_err();
            match err {
                NotesError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
                other => panic!("unexpected error: {:?}", other),
            }
        }
        assert!(matches!(store.read("..", "db"), Err(NotesError::Io(_))));
        assert!(matches!(store.list("../db"), Err(NotesError::Io(_))));

        // nothing was created next to the root
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_dir(dir.path().join("db")).unwrap().count(), 0);
    }
}
