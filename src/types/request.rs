use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginParams {
    pub(crate) return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CallbackParams {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteNoteForm {
    pub(crate) id: Option<String>,
    pub(crate) current: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveNoteForm {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateNoteData {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageParams {
    #[serde(rename = "sessionId")]
    pub(crate) session_id: String,
}
