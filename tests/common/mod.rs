#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use squiggles::core::config::Args;
use squiggles::core::state::AppState;
use squiggles::core::store;
use squiggles::routes::router::router;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BASE_URL: &str = "http://localhost:3000";

pub struct TestApp {
    pub router: Router,
    pub github: MockServer,
}

impl TestApp {
    pub async fn new() -> Self {
        let github = MockServer::start().await;

        let args = Args {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: Some("test-secret".to_string()),
            github_client_id: Some("github-client".to_string()),
            github_client_secret: Some("github-secret".to_string()),
            redirect_base_url: Some(BASE_URL.to_string()),
            github_url: github.uri(),
            github_api_url: github.uri(),
            ..Args::default()
        };

        let pool = store::connect(&args.database_url).await.unwrap();
        let state = AppState::new(pool, &args).unwrap();

        Self {
            router: router(state),
            github,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Answers the token exchange and the profile lookup for one GitHub user.
    pub async fn mock_github_user(&self, id: i64, login: &str) {
        self.github.reset().await;

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gho_test",
                "token_type": "bearer",
                "scope": "user:email",
            })))
            .mount(&self.github)
            .await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "login": login,
                "avatar_url": format!("https://avatars.example/{}", login),
            })))
            .mount(&self.github)
            .await;
    }

    /// Starts a login, returning the GitHub authorize URL and the flow cookies.
    pub async fn start_login(&self, return_to: Option<&str>) -> (url::Url, String) {
        let uri = match return_to {
            Some(return_to) => format!(
                "/auth/github?{}",
                serde_urlencoded::to_string([("return_to", return_to)]).unwrap()
            ),
            None => "/auth/github".to_string(),
        };

        let response = self.send(get(&uri, None)).await;
        assert_eq!(response.status(), 302);

        let authorize = url::Url::parse(location(&response)).unwrap();
        let cookies = cookie_header(&response);

        (authorize, cookies)
    }

    /// Runs the whole GitHub login and returns the callback response.
    pub async fn complete_login(&self, return_to: Option<&str>) -> Response<Body> {
        let (authorize, cookies) = self.start_login(return_to).await;
        let state = query_param(&authorize, "state").unwrap();

        let callback = format!(
            "/auth/github/callback?{}",
            serde_urlencoded::to_string([("code", "github-code"), ("state", state.as_str())])
                .unwrap()
        );

        self.send(get(&callback, Some(&cookies))).await
    }

    /// Signs in as a GitHub user and returns a `Cookie` header carrying the session.
    pub async fn sign_in(&self, id: i64, login: &str) -> String {
        self.mock_github_user(id, login).await;

        let response = self.complete_login(None).await;
        assert_eq!(response.status(), 302);

        let session = set_cookie(&response, "session").unwrap();
        format!("session={}", session)
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, cookie: Option<&str>, form: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
        .unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    authorization: Option<(&str, &str)>,
    body: &Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((name, value)) = authorization {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

/// The value of a non-empty `Set-Cookie` named `name`.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Every cookie the response set, as a request `Cookie` header.
pub fn cookie_header(response: &Response<Body>) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
