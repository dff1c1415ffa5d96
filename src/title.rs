//! Window title parsing
//!
//! Maps whatever title the shell currently shows to the activity it implies.
//! Pure and deterministic; the shell's own branded format and the hosted
//! application's conventions are both understood.

use crate::constants::{brand, hosted};

/// What a window title says the user is doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    /// Library, menus, or anything without a game
    Idle,
    /// A game session with its display name
    Playing(String),
}

impl Activity {
    pub fn game(&self) -> Option<&str> {
        match self {
            Activity::Idle => None,
            Activity::Playing(name) => Some(name),
        }
    }

    /// Title the shell should display for this activity
    pub fn branded_title(&self) -> String {
        match self {
            Activity::Idle => brand::TITLE.to_string(),
            Activity::Playing(name) => format!("{}{}{}", brand::TITLE, brand::SEPARATOR, name),
        }
    }
}

fn non_empty(name: &str) -> Activity {
    let name = name.trim();
    if name.is_empty() {
        Activity::Idle
    } else {
        Activity::Playing(name.to_string())
    }
}

/// Parse a raw window title
pub fn parse_title(title: &str) -> Activity {
    let title = title.trim();

    // Branding, with or without the hosted app's name appended
    if title == brand::TITLE
        || title == hosted::BARE_TITLE
        || title
            .strip_prefix(brand::TITLE)
            .and_then(|rest| rest.strip_prefix(brand::SEPARATOR))
            .is_some_and(|rest| rest.trim() == hosted::BARE_TITLE)
    {
        return Activity::Idle;
    }

    // Already rewritten by the shell: "<Brand> | <Game>"
    if let Some(game) = title
        .strip_prefix(brand::TITLE)
        .and_then(|rest| rest.strip_prefix(brand::SEPARATOR.trim_end()))
    {
        return non_empty(game);
    }

    let stripped = title.strip_prefix(hosted::TITLE_PREFIX).unwrap_or(title);
    let stripped = stripped.strip_suffix(hosted::TITLE_SUFFIX).unwrap_or(stripped);
    non_empty(stripped)
}
