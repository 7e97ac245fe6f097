use axum::extract::{Extension, Form, Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::note::{Note, NoteChanges};
use crate::types::request::{DeleteNoteForm, SaveNoteForm, UpdateNoteData};
use crate::types::response::{Found, NotesPage, SaveResult};
use crate::types::user::SessionUser;

fn note_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

#[instrument(skip(state))]
pub(crate) async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> Result<Response, Error> {
    let notes = state.notes.list(session.user_id).await?;

    if let Some(latest) = notes.first() {
        return Ok(Found::to(format!("/notes/{}", latest.id)).into_response());
    }

    let Some(user) = state.users.get_user_by_id(session.user_id).await? else {
        return Ok(Found::to("/").into_response());
    };

    Ok(Json(NotesPage {
        user,
        notes,
        selected_note: None,
    })
    .into_response())
}

#[instrument(skip(state))]
pub(crate) async fn show(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let Some(user) = state.users.get_user_by_id(session.user_id).await? else {
        return Ok(Found::to("/").into_response());
    };

    let notes = state.notes.list(session.user_id).await?;

    let selected_note = note_id(&id).and_then(|id| notes.iter().find(|note| note.id == id).cloned());

    match selected_note {
        Some(selected_note) => Ok(Json(NotesPage {
            user,
            notes,
            selected_note: Some(selected_note),
        })
        .into_response()),
        None => Ok(Found::to("/notes").into_response()),
    }
}

#[instrument(skip(state))]
pub(crate) async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> Result<Found, Error> {
    let note = state.notes.create(session.user_id, None, None).await?;

    Ok(Found::to(format!("/notes/{}", note.id)))
}

#[instrument(skip(state))]
pub(crate) async fn delete(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Form(form): Form<DeleteNoteForm>,
) -> Result<Response, Error> {
    let id = form
        .id
        .as_deref()
        .and_then(note_id)
        .ok_or(Error::BadRequest("Note ID is required"))?;

    state.notes.delete(session.user_id, id).await?;

    if form.current.is_some() {
        return Ok(Found::to("/notes").into_response());
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[instrument(skip(state, form))]
pub(crate) async fn save(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Path(id): Path<String>,
    Form(form): Form<SaveNoteForm>,
) -> Result<Json<SaveResult>, Error> {
    let (Some(title), Some(content)) = (
        form.title.filter(|title| !title.is_empty()),
        form.content.filter(|content| !content.is_empty()),
    ) else {
        return Err(Error::BadRequest("All fields are required"));
    };

    let id = note_id(&id).ok_or(Error::NoteNotFound)?;

    state
        .notes
        .update(
            session.user_id,
            id,
            NoteChanges {
                title: Some(title),
                content: Some(content),
            },
        )
        .await?
        .ok_or(Error::NoteNotFound)?;

    Ok(Json(SaveResult { success: true }))
}

#[instrument(skip(state, data))]
pub(crate) async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Path(id): Path<String>,
    Json(data): Json<UpdateNoteData>,
) -> Result<Json<Note>, Error> {
    let id = note_id(&id).ok_or(Error::NoteNotFound)?;

    let note = state
        .notes
        .update(
            session.user_id,
            id,
            NoteChanges {
                title: data.title,
                content: data.content,
            },
        )
        .await?
        .ok_or(Error::NoteNotFound)?;

    Ok(Json(note))
}
