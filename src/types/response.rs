use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::types::note::Note;
use crate::types::user::User;

/// A `302 Found` redirect.
#[derive(Debug, Clone)]
pub(crate) struct Found(String);

impl Found {
    pub(crate) fn to(location: impl Into<String>) -> Self {
        Self(location.into())
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(LOCATION, self.0)]).into_response()
    }
}

#[derive(Serialize)]
pub(crate) struct NotesPage {
    pub(crate) user: User,
    pub(crate) notes: Vec<Note>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) selected_note: Option<Note>,
}

#[derive(Serialize)]
pub(crate) struct SaveResult {
    pub(crate) success: bool,
}
