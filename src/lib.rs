#![deny(missing_docs)]
//! A multithreaded note-storage server, and its client, exchanging JSON messages over TCP.
//!
//! This crate provides the [`FsStore`] storage engine, the [`NotesServer`] and the
//! [`NotesClient`], as well as a `notes-server` and `notes-client` executable that can be used
//! to run and talk to a server.
//!
//! ## Supported Operations
//! A [`Note`] is identified by its (`user`, `title`) pair. The server supports five types of
//! requests:
//!
//! - `add` a new note, failing if it already exists
//! - `update` an existing note, replacing it completely
//! - `remove` a note
//! - `read` a single note
//! - `list` every note of a user
//!
//! See the [`NotesEngine`] trait and the [`Request`] and [`Response`] types for more information
//! on the structure of these operations.
//!
//! ## Custom Protocol
//! A request is a JSON object such as `{"type":"read","user":"u1","title":"t1"}`, sent as is:
//! there is no length prefix and no delimiter. The server finds where a message ends by counting
//! braces (see [`Framer`]) and answers it with a single JSON [`Response`] like
//! `{"type":"read","success":true,"notes":[...]}`. A failed request gets `"success":false` and
//! an `error` text. Errors are always reported in a response and never close the connection.
//!
//! Connections are persistent: a client may send any number of requests, one at a time, on
//! the same connection.
//!
//! ## Note Files
//! [`FsStore`] keeps every user in a directory of its root (the "db dir", `./db` for the
//! server executable) and every note in a `<title>.json` file of that directory. A user
//! directory is created by the first `add` (or `update`) and never deleted.
//!
//! ## Starting a server
//! [`start`] runs a server on a port with the default engine. Every connection is read by its
//! own session thread and every request runs on a new thread. [`NotesServer`] lets you pick
//! the engine and the [`ThreadPool`] the requests run on.

pub use client::NotesClient;
pub use command::{Request, Response, ResponseKind};
pub use dispatch::Dispatcher;
pub use engine::{FsStore, NotesEngine};
pub use error::{NotesError, Result};
pub use framer::{Frames, Framer};
pub use note::{Color, Note};
pub use server::{start, NotesServer, ServerHandle};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

mod client;
mod command;
mod dispatch;
mod engine;
mod error;
mod framer;
mod note;
mod server;
pub mod thread_pool;
