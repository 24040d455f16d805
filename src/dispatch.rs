use serde_json::Value;
use tracing::debug;

use crate::command::{Request, RequestMessage, Response};
use crate::{Note, NotesEngine};

/// Routes decoded messages to the matching [`NotesEngine`] operation and builds the
/// [`Response`].
///
/// Every call produces exactly one response. A failure never escapes as an `Err`: it becomes a
/// response with `success: false` and leaves the connection usable.
#[derive(Debug, Clone)]
pub struct Dispatcher<E: NotesEngine> {
    engine: E,
}

impl<E: NotesEngine> Dispatcher<E> {
    /// creates a dispatcher over the given `engine`
    pub fn new(engine: E) -> Self {
        Dispatcher { engine }
    }

    /// dispatches one framed message, as produced by a [`Framer`](crate::Framer).
    ///
    /// A message that failed to decode, is not an object of the expected shape, or has no
    /// recognized `type` gets the `unknown` response.
    pub fn dispatch(&self, message: serde_json::Result<Value>) -> Response {
        let message: RequestMessage = match message.and_then(serde_json::from_value) {
            Ok(message) => message,
            Err(e) => {
                debug!("malformed message: {}", e);
                return Response::unknown();
            }
        };

        let kind = message.kind();
        match message.into_request() {
            Ok(request) => self.handle(request),
            Err(e) => Response::failure(kind, &e),
        }
    }

    /// carries out a validated request against the engine
    pub fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let result = match request {
            Request::Add { user, title, body, color } => self
                .engine
                .add(Note { user, title, body, color })
                .map(|_| None),
            Request::Update { user, title, body, color } => self
                .engine
                .update(Note { user, title, body, color })
                .map(|note| Some(vec![note])),
            Request::Remove { user, title } => self.engine.remove(&user, &title).map(|_| None),
            Request::Read { user, title } => self
                .engine
                .read(&user, &title)
                .map(|note| Some(vec![note])),
            Request::List { user } => self.engine.list(&user).map(Some),
        };

        match result {
            Ok(None) => Response::ok(kind),
            Ok(Some(notes)) => Response::with_notes(kind, notes),
            Err(e) => Response::failure(kind, &e),
        }
    }
}
