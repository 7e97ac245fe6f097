use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use tower_cookies::Cookies;
use tracing::instrument;

use crate::core::state::AppState;
use crate::types::response::Found;
use crate::utils::auth::session_from_cookies;

const LANDING_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Squiggles</title>
</head>
<body>
<main>
<h1>Squiggles</h1>
<p>Your notes, in markdown, wherever you are.</p>
<a href="/auth/github">Sign in with GitHub</a>
</main>
</body>
</html>
"#;

#[instrument(skip_all)]
pub(crate) async fn home(State(state): State<AppState>, cookies: Cookies) -> Response {
    match session_from_cookies(&cookies, state.jwt.as_ref()) {
        Ok(_) => Found::to("/notes").into_response(),
        Err(_) => Html(LANDING_PAGE).into_response(),
    }
}
