use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NotesError;

/// The colors a [`Note`] can be tagged with
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// red
    Red,
    /// green
    Green,
    /// blue
    Blue,
    /// yellow
    Yellow,
}

impl Color {
    /// the names accepted on the wire and on the command line
    pub const NAMES: [&'static str; 4] = ["red", "green", "blue", "yellow"];

    /// the lowercase wire name of this color
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Yellow => "yellow",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Color::Red),
            "green" => Ok(Color::Green),
            "blue" => Ok(Color::Blue),
            "yellow" => Ok(Color::Yellow),
            other => Err(NotesError::Parsing(format!("invalid color: {}", other))),
        }
    }
}

/// A single note. Its identity is the pair (`user`, `title`); `title` is unique within a
/// user's namespace. Writes always replace the whole record.
///
/// Field order matters: it is the order the fields are written in a note file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// the owner namespace
    pub user: String,
    /// key of the note within the owner's namespace
    pub title: String,
    /// free text
    pub body: String,
    /// the note's color
    pub color: Color,
}

impl Note {
    /// builds a new `Note`
    pub fn new<U, T, B>(user: U, title: T, body: B, color: Color) -> Self
    where
        U: Into<String>,
        T: Into<String>,
        B: Into<String>,
    {
        Note {
            user: user.into(),
            title: title.into(),
            body: body.into(),
            color,
        }
    }
}
