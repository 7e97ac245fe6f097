use serde::Serialize;

use crate::types::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct Note {
    pub(crate) id: i64,
    pub(crate) user_id: UserId,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct NoteChanges {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
}
