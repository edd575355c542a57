//! HTTP front end
//!
//! A blocking tiny_http loop handling one request at a time. Routing is a
//! pure function from (method, url) to a [`Reply`] so it can be tested
//! without a socket.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{error, info, warn};
use mail::{
    ApiError, ClientCell, GmailClient, GoogleOAuth, RequestParams, SessionError, SessionHandler,
    TokenError, TokenManager, TokenStore,
};
use serde_json::{Value, json};
use tiny_http::{Header, Response, Server};
use url::Url;

/// Shared state handed to every request
pub struct AppState {
    store: Arc<dyn TokenStore>,
    sessions: SessionHandler,
    oauth: Arc<GoogleOAuth>,
    gmail: ClientCell<GmailClient>,
}

impl AppState {
    pub fn new(store: Arc<dyn TokenStore>, oauth: Arc<GoogleOAuth>) -> Self {
        Self {
            sessions: SessionHandler::new(store.clone()),
            store,
            oauth,
            gmail: ClientCell::new(),
        }
    }

    /// Gmail client, built on first use
    fn gmail(&self) -> Arc<GmailClient> {
        self.gmail.get_or_init(|| {
            info!("Initializing Gmail client");
            let tokens = TokenManager::new(self.store.clone()).with_refresh(self.oauth.clone());
            GmailClient::new(Arc::new(tokens))
        })
    }
}

/// Response produced by a route
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub location: Option<String>,
}

impl Reply {
    fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: format!("<html><body>{}</body></html>", body.into()),
            location: None,
        }
    }

    fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
            location: None,
        }
    }

    fn json_error(status: u16, message: impl std::fmt::Display) -> Self {
        Self::json(status, &json!({ "error": message.to_string() }))
    }

    fn redirect(location: String) -> Self {
        Self {
            status: 302,
            content_type: "text/plain; charset=utf-8",
            body: String::new(),
            location: Some(location),
        }
    }

    fn into_response(self) -> Result<Response<std::io::Cursor<Vec<u8>>>> {
        let mut response = Response::from_string(self.body)
            .with_status_code(self.status)
            .with_header(header("Content-Type", self.content_type)?);

        if let Some(location) = self.location {
            response = response.with_header(header("Location", &location)?);
        }

        Ok(response)
    }
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|_| anyhow!("Invalid header {}: {}", name, value))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Map a Gmail call failure to a JSON error reply
fn api_error_reply(err: &anyhow::Error) -> Reply {
    if let Some(token_err) = err.downcast_ref::<TokenError>() {
        return Reply::json_error(401, token_err);
    }
    if let Some(api_err) = err.downcast_ref::<ApiError>() {
        return Reply::json_error(502, api_err);
    }
    Reply::json_error(500, format!("{:#}", err))
}

/// Dispatch a request
pub fn route(state: &AppState, method: &str, url: &str) -> Reply {
    let Ok(parsed) = Url::parse(&format!("http://localhost{}", url)) else {
        return Reply::html(400, "Bad request");
    };

    if method != "GET" {
        return Reply::html(405, "Method not allowed");
    }

    let query: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let param = |name: &str| {
        query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    match parsed.path() {
        "/" => index(state),
        "/auth/google_oauth2" => Reply::redirect(state.oauth.authorization_url()),
        "/auth/google_oauth2/callback" => {
            if let Some(err) = param("error") {
                warn!("OAuth callback returned error: {}", err);
                return Reply::redirect(format!(
                    "/auth/failure?message={}",
                    url::form_urlencoded::byte_serialize(err.as_bytes()).collect::<String>()
                ));
            }
            match param("code") {
                Some(code) if !code.is_empty() => callback(state, code),
                _ => Reply::html(400, "Missing authorization code"),
            }
        }
        "/auth/failure" => Reply::html(
            400,
            format!(
                "<h1>Authentication failed</h1><p>{}</p><p><a href=\"/auth/google_oauth2\">Try again</a></p>",
                escape_html(param("message").unwrap_or("unknown error"))
            ),
        ),
        "/messages" => list(state, &query, |client, params| client.messages(params)),
        "/labels" => list(state, &query, |client, params| client.labels(params)),
        _ => Reply::html(404, "Not found"),
    }
}

fn index(state: &AppState) -> Reply {
    match state.store.latest() {
        Ok(Some(token)) => Reply::html(
            200,
            format!(
                "<p>Signed in as {}</p><p><a href=\"/messages\">Messages</a> | <a href=\"/labels\">Labels</a></p>",
                escape_html(&token.email)
            ),
        ),
        Ok(None) => Reply::html(
            200,
            "<p><a href=\"/auth/google_oauth2\">Sign in with Google</a></p>",
        ),
        Err(e) => {
            error!("Failed to load token: {:#}", e);
            Reply::html(500, "Internal error")
        }
    }
}

fn callback(state: &AppState, code: &str) -> Reply {
    let auth = match state.oauth.callback(code) {
        Ok(auth) => auth,
        Err(e) => {
            error!("OAuth code exchange failed: {:#}", e);
            return Reply::html(502, "<h1>Authentication failed</h1><p>Could not reach Google.</p>");
        }
    };

    match state.sessions.create(&auth) {
        Ok(token) => Reply::html(
            200,
            format!(
                "<h1>Signed in</h1><p>{}</p><p><a href=\"/messages\">Messages</a> | <a href=\"/labels\">Labels</a></p>",
                escape_html(&token.email)
            ),
        ),
        Err(SessionError::Store(e)) => {
            error!("Failed to store token: {:#}", e);
            Reply::html(500, "Internal error")
        }
        Err(e) => {
            warn!("Rejected OAuth callback: {}", e);
            Reply::html(400, format!("<h1>Authentication failed</h1><p>{}</p>", escape_html(&e.to_string())))
        }
    }
}

fn list(
    state: &AppState,
    query: &[(String, String)],
    call: impl FnOnce(&GmailClient, &RequestParams) -> Result<Option<Value>>,
) -> Reply {
    let params = match RequestParams::from_pairs(query.iter().map(|(k, v)| (k, v))) {
        Ok(params) => params,
        Err(e) => return Reply::json_error(400, e),
    };

    let client = state.gmail();
    match call(client.as_ref(), &params) {
        Ok(items) => Reply::json(200, &items.unwrap_or(Value::Null)),
        Err(e) => {
            warn!("Gmail request failed: {:#}", e);
            api_error_reply(&e)
        }
    }
}

/// Serve requests until the listener shuts down
pub fn serve(state: &AppState, server: &Server) {
    for request in server.incoming_requests() {
        let method = request.method().to_string();
        let url = request.url().to_string();

        let reply = route(state, &method, &url);
        info!("{} {} -> {}", method, url, reply.status);

        let result = reply
            .into_response()
            .and_then(|response| request.respond(response).map_err(Into::into));
        if let Err(e) = result {
            warn!("Failed to send response for {} {}: {:#}", method, url, e);
        }
    }
}

/// Bind `addr` and serve forever
pub fn run(state: &AppState, addr: &str) -> Result<()> {
    let server = Server::http(addr).map_err(|e| anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("Listening on http://{}", addr);
    serve(state, &server);
    Ok(())
}
