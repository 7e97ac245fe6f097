mod common;

use axum::http::header;
use common::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use squiggles::utils::pkce;

const CLIENT_REDIRECT: &str = "http://localhost:6274/oauth/callback";

async fn register_client(app: &TestApp) -> String {
    let response = app
        .send(json_request(
            "POST",
            "/register",
            None,
            &json!({ "redirect_uris": [CLIENT_REDIRECT], "client_name": "Inspector" }),
        ))
        .await;
    assert_eq!(response.status(), 201);

    let client = body_json(response).await;
    assert!(client.get("client_secret").is_none());
    client["client_id"].as_str().unwrap().to_string()
}

fn authorize_uri(client_id: &str, challenge: &str) -> String {
    format!(
        "/authorize?{}",
        serde_urlencoded::to_string([
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", CLIENT_REDIRECT),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("state", "client-state"),
        ])
        .unwrap()
    )
}

fn token_request(form: &[(&str, &str)]) -> axum::http::Request<axum::body::Body> {
    post_form("/token", None, form)
}

fn rpc(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params })
}

struct Tokens {
    access_token: String,
    refresh_token: String,
}

/// Registers a client, signs in, and redeems a code for tokens.
async fn authorize_client(app: &TestApp) -> (String, String, Tokens) {
    let client_id = register_client(app).await;
    let session = app.sign_in(9, "octocat").await;

    let verifier = pkce::generate_code_verifier();
    let challenge = pkce::generate_code_challenge(&verifier);

    let response = app
        .send(get(&authorize_uri(&client_id, &challenge), Some(&session)))
        .await;
    assert_eq!(response.status(), 302);

    let redirect = url::Url::parse(location(&response)).unwrap();
    assert!(redirect.as_str().starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("client-state"));
    let code = query_param(&redirect, "code").unwrap();

    let response = app
        .send(token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", CLIENT_REDIRECT),
            ("client_id", client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ]))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["expires_in"].as_i64().unwrap() > 0);

    let tokens = Tokens {
        access_token: body["access_token"].as_str().unwrap().to_string(),
        refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
    };

    (client_id, session, tokens)
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[tokio::test]
async fn discovery_metadata() {
    let app = TestApp::new().await;

    let server = body_json(
        app.send(get("/.well-known/oauth-authorization-server", None))
            .await,
    )
    .await;
    assert_eq!(server["issuer"], BASE_URL);
    assert_eq!(server["token_endpoint"], "http://localhost:3000/token");
    assert_eq!(server["registration_endpoint"], "http://localhost:3000/register");
    assert_eq!(server["code_challenge_methods_supported"], json!(["S256"]));

    let resource = body_json(
        app.send(get("/.well-known/oauth-protected-resource", None))
            .await,
    )
    .await;
    assert_eq!(resource["resource"], "http://localhost:3000/mcp");
    assert_eq!(resource["authorization_servers"], json!([BASE_URL]));
}

#[tokio::test]
async fn registration_requires_a_redirect_uri() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request("POST", "/register", None, &json!({ "client_name": "x" })))
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "invalid_redirect_uri");
}

#[tokio::test]
async fn authorize_without_session_goes_through_github_login() {
    let app = TestApp::new().await;
    let client_id = register_client(&app).await;
    let challenge = pkce::generate_code_challenge(&pkce::generate_code_verifier());
    let uri = authorize_uri(&client_id, &challenge);

    let response = app.send(get(&uri, None)).await;
    assert_eq!(response.status(), 302);

    let login = url::Url::parse(location(&response)).unwrap();
    assert_eq!(login.path(), "/auth/github");
    assert_eq!(
        query_param(&login, "return_to"),
        Some(format!("{}{}", BASE_URL, uri))
    );
}

#[tokio::test]
async fn authorize_rejects_plain_challenges_and_unknown_redirects() {
    let app = TestApp::new().await;
    let client_id = register_client(&app).await;

    let plain = authorize_uri(&client_id, "challenge").replace("S256", "plain");
    let response = app.send(get(&plain, None)).await;
    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    let foreign = authorize_uri(&client_id, "challenge").replace("6274", "9999");
    let response = app.send(get(&foreign, None)).await;
    assert_eq!(response.status(), 400);

    let unknown = authorize_uri("no-such-client", "challenge");
    let response = app.send(get(&unknown, None)).await;
    assert_eq!(response.status(), 401);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn codes_are_single_use() {
    let app = TestApp::new().await;
    let client_id = register_client(&app).await;
    let session = app.sign_in(9, "octocat").await;

    let verifier = pkce::generate_code_verifier();
    let challenge = pkce::generate_code_challenge(&verifier);
    let response = app
        .send(get(&authorize_uri(&client_id, &challenge), Some(&session)))
        .await;
    let redirect = url::Url::parse(location(&response)).unwrap();
    let code = query_param(&redirect, "code").unwrap();

    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("client_id", client_id.as_str()),
        ("code_verifier", verifier.as_str()),
    ];

    assert_eq!(app.send(token_request(&form)).await.status(), 200);

    let response = app.send(token_request(&form)).await;
    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let app = TestApp::new().await;
    let client_id = register_client(&app).await;
    let session = app.sign_in(9, "octocat").await;

    let challenge = pkce::generate_code_challenge(&pkce::generate_code_verifier());
    let response = app
        .send(get(&authorize_uri(&client_id, &challenge), Some(&session)))
        .await;
    let redirect = url::Url::parse(location(&response)).unwrap();
    let code = query_param(&redirect, "code").unwrap();

    let other_verifier = pkce::generate_code_verifier();
    let response = app
        .send(token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", client_id.as_str()),
            ("code_verifier", other_verifier.as_str()),
        ]))
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn unsupported_grant_type() {
    let app = TestApp::new().await;

    let response = app
        .send(token_request(&[
            ("grant_type", "client_credentials"),
            ("client_id", "anyone"),
        ]))
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn bearer_token_creates_notes_for_the_signed_in_user() {
    let app = TestApp::new().await;
    let (_, session, tokens) = authorize_client(&app).await;

    let response = app
        .send(json_request(
            "POST",
            "/mcp",
            Some(("authorization", bearer(&tokens.access_token).as_str())),
            &rpc(
                "tools/call",
                json!({ "name": "create", "arguments": { "title": "From MCP", "content": "hello" } }),
            ),
        ))
        .await;
    assert_eq!(response.status(), 200);

    let body = body_json(response).await;
    assert_eq!(
        body["result"]["content"][0]["text"],
        "Note \"From MCP\" created successfully."
    );

    let response = app.send(get("/notes", Some(&session))).await;
    let page = body_json(app.send(get(location(&response), Some(&session))).await).await;
    assert_eq!(page["selected_note"]["title"], "From MCP");
    assert_eq!(page["selected_note"]["content"], "hello");
}

#[tokio::test]
async fn anonymous_tool_calls_get_a_tool_error() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/mcp",
            None,
            &rpc("tools/call", json!({ "name": "list", "arguments": {} })),
        ))
        .await;
    assert_eq!(response.status(), 200);

    let body = body_json(response).await;
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        "You must be authenticated to perform this action."
    );
}

#[tokio::test]
async fn unknown_bearer_token_is_challenged() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/mcp",
            Some(("authorization", "Bearer not-a-token")),
            &rpc("tools/list", json!({})),
        ))
        .await;

    assert_eq!(response.status(), 401);
    let challenge = response.headers()[header::WWW_AUTHENTICATE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(challenge.starts_with("Bearer"));
    assert!(challenge.contains(
        "resource_metadata=\"http://localhost:3000/.well-known/oauth-protected-resource\""
    ));
}

#[tokio::test]
async fn notifications_are_accepted_without_a_body() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/mcp",
            None,
            &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        ))
        .await;

    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn refresh_rotates_both_tokens() {
    let app = TestApp::new().await;
    let (client_id, _, tokens) = authorize_client(&app).await;

    let response = app
        .send(token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ]))
        .await;
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    let new_access = body["access_token"].as_str().unwrap().to_string();
    assert_ne!(new_access, tokens.access_token);
    assert_ne!(body["refresh_token"], tokens.refresh_token.as_str());

    let list = rpc("tools/call", json!({ "name": "list", "arguments": {} }));

    let old = app
        .send(json_request(
            "POST",
            "/mcp",
            Some(("authorization", bearer(&tokens.access_token).as_str())),
            &list,
        ))
        .await;
    assert_eq!(old.status(), 401);

    let new = app
        .send(json_request(
            "POST",
            "/mcp",
            Some(("authorization", bearer(&new_access).as_str())),
            &list,
        ))
        .await;
    assert_eq!(new.status(), 200);
    assert_eq!(body_json(new).await["result"]["content"][0]["text"], "[]");

    let reused = app
        .send(token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ]))
        .await;
    assert_eq!(reused.status(), 400);
}

async fn next_event(body: &mut axum::body::Body) -> String {
    loop {
        let frame = body.frame().await.unwrap().unwrap();
        if let Ok(data) = frame.into_data() {
            let text = String::from_utf8(data.to_vec()).unwrap();
            if !text.starts_with(':') {
                return text;
            }
        }
    }
}

#[tokio::test]
async fn sse_transport_pushes_responses() {
    let app = TestApp::new().await;
    let (_, _, tokens) = authorize_client(&app).await;

    let mut request = get("/sse", None);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        bearer(&tokens.access_token).parse().unwrap(),
    );
    let response = app.send(request).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let mut body = response.into_body();
    let endpoint = next_event(&mut body).await;
    assert!(endpoint.starts_with("event: endpoint\n"));

    let path = endpoint
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap()
        .to_string();
    assert!(path.starts_with("/messages?sessionId="));

    let response = app
        .send(json_request("POST", &path, None, &rpc("ping", json!({}))))
        .await;
    assert_eq!(response.status(), 202);

    let message = next_event(&mut body).await;
    assert!(message.starts_with("event: message\n"));
    assert!(message.contains(r#""result":{}"#));

    let response = app
        .send(json_request(
            "POST",
            "/messages?sessionId=missing",
            None,
            &rpc("ping", json!({})),
        ))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn sse_session_ends_when_its_token_is_rotated() {
    let app = TestApp::new().await;
    let (client_id, _, tokens) = authorize_client(&app).await;

    let mut request = get("/sse", None);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        bearer(&tokens.access_token).parse().unwrap(),
    );
    let mut body = app.send(request).await.into_body();
    let endpoint = next_event(&mut body).await;
    let path = endpoint
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap()
        .to_string();

    let response = app
        .send(token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("client_id", client_id.as_str()),
        ]))
        .await;
    assert_eq!(response.status(), 200);

    let create = rpc(
        "tools/call",
        json!({ "name": "create", "arguments": { "title": "after rotation", "content": "" } }),
    );

    let response = app.send(json_request("POST", &path, None, &create)).await;
    assert_eq!(response.status(), 401);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let response = app.send(json_request("POST", &path, None, &create)).await;
    assert_eq!(response.status(), 404);

    assert!(body.frame().await.is_none());
}

#[tokio::test]
async fn cors_preflight_mirrors_the_origin() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/token")
        .header(header::ORIGIN, "http://localhost:6274")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:6274"
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
}
