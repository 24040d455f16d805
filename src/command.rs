use serde::{Deserialize, Serialize};

use crate::{Color, Note, NotesError, Result};

/// These are the request "commands" that can be made to a notes server.
///
/// On the wire a request is a flat JSON object tagged by its `type` field, e.g.
/// `{"type":"read","user":"u1","title":"t1"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// store a new note, fails if it already exists
    Add {
        /// owner of the note
        user: String,
        /// title of the note
        title: String,
        /// text of the note
        body: String,
        /// color of the note
        color: Color,
    },
    /// replace an existing note
    Update {
        /// owner of the note
        user: String,
        /// title of the note
        title: String,
        /// new text of the note
        body: String,
        /// new color of the note
        color: Color,
    },
    /// remove a note
    Remove {
        /// owner of the note
        user: String,
        /// title of the note to remove
        title: String,
    },
    /// read a single note
    Read {
        /// owner of the note
        user: String,
        /// title of the note to read
        title: String,
    },
    /// list every note of a user
    List {
        /// the user whose notes are listed
        user: String,
    },
}

impl Request {
    /// an `add` request for `note`
    pub fn add(note: Note) -> Self {
        let Note { user, title, body, color } = note;
        Request::Add { user, title, body, color }
    }

    /// an `update` request replacing the stored note with `note`
    pub fn update(note: Note) -> Self {
        let Note { user, title, body, color } = note;
        Request::Update { user, title, body, color }
    }

    /// the response kind that answers this request
    pub fn kind(&self) -> ResponseKind {
        match self {
            Request::Add { .. } => ResponseKind::Add,
            Request::Update { .. } => ResponseKind::Update,
            Request::Remove { .. } => ResponseKind::Remove,
            Request::Read { .. } => ResponseKind::Read,
            Request::List { .. } => ResponseKind::List,
        }
    }
}

/// The `type` tag of a [`Response`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// answers an `add`
    Add,
    /// answers an `update`
    Update,
    /// answers a `remove`
    Remove,
    /// answers a `read`
    Read,
    /// answers a `list`
    List,
    /// answers anything that could not be routed
    Unknown,
}

impl ResponseKind {
    fn from_type(name: &str) -> Self {
        match name {
            "add" => ResponseKind::Add,
            "update" => ResponseKind::Update,
            "remove" => ResponseKind::Remove,
            "read" => ResponseKind::Read,
            "list" => ResponseKind::List,
            _ => ResponseKind::Unknown,
        }
    }
}

/// The response returned for any [`Request`], exactly one per request.
///
/// `notes` is only present on a successful `read` (a single note), `update` (the note
/// written) and `list`. `error` is only present when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// the kind of request this answers
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    /// whether the request was carried out
    pub success: bool,
    /// notes returned by `read`, `update` and `list`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
    /// a human readable description of the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// a successful response without payload
    pub fn ok(kind: ResponseKind) -> Self {
        Response {
            kind,
            success: true,
            notes: None,
            error: None,
        }
    }

    /// a successful response carrying `notes`
    pub fn with_notes(kind: ResponseKind, notes: Vec<Note>) -> Self {
        Response {
            kind,
            success: true,
            notes: Some(notes),
            error: None,
        }
    }

    /// a failed response, the error text is the `Display` of `err`
    pub fn failure(kind: ResponseKind, err: &NotesError) -> Self {
        Response {
            kind,
            success: false,
            notes: None,
            error: Some(err.to_string()),
        }
    }

    /// true if this response answers a request of the given `kind`
    pub fn answers(&self, kind: ResponseKind) -> bool {
        self.kind == kind
    }

    /// the response to a message that could not be routed to any handler
    pub fn unknown() -> Self {
        Response::failure(ResponseKind::Unknown, &NotesError::UnknownRequest)
    }
}

/// The loosely typed shape of an incoming message, before validation.
///
/// Every field is optional so that a request missing a field still yields its kind, and
/// can be answered with a `Missing parameters` response of that kind.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RequestMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    user: Option<String>,
    title: Option<String>,
    body: Option<String>,
    color: Option<String>,
}

/// an empty string is treated the same as an absent field
fn required(field: Option<String>) -> Result<String> {
    field
        .filter(|value| !value.is_empty())
        .ok_or(NotesError::MissingParameters)
}

impl RequestMessage {
    /// the kind of response this message will get, `Unknown` if the `type` is not routable
    pub(crate) fn kind(&self) -> ResponseKind {
        self.kind
            .as_deref()
            .map_or(ResponseKind::Unknown, ResponseKind::from_type)
    }

    /// validates the fields required by the message's kind and builds a typed [`Request`]
    ///
    /// # Errors
    /// `NotesError::MissingParameters` if a required field is absent or empty, or if the color
    /// is not one of the known colors.
    /// `NotesError::UnknownRequest` if the `type` is missing or not recognized.
    pub(crate) fn into_request(self) -> Result<Request> {
        let kind = self.kind();
        let RequestMessage { user, title, body, color, .. } = self;
        let parse_color = || -> Result<Color> {
            required(color)?
                .parse()
                .map_err(|_| NotesError::MissingParameters)
        };

        match kind {
            ResponseKind::Add => Ok(Request::Add {
                user: required(user)?,
                title: required(title)?,
                body: required(body)?,
                color: parse_color()?,
            }),
            ResponseKind::Update => Ok(Request::Update {
                user: required(user)?,
                title: required(title)?,
                body: required(body)?,
                color: parse_color()?,
            }),
            ResponseKind::Remove => Ok(Request::Remove {
                user: required(user)?,
                title: required(title)?,
            }),
            ResponseKind::Read => Ok(Request::Read {
                user: required(user)?,
                title: required(title)?,
            }),
            ResponseKind::List => Ok(Request::List { user: required(user)? }),
            ResponseKind::Unknown => Err(NotesError::UnknownRequest),
        }
    }
}
