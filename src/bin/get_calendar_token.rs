use kalenteribotti::components::google_calendar::token::consent_url;
use kalenteribotti::components::google_calendar::GoogleCredentialStore;
use kalenteribotti::config::Config;
use kalenteribotti::error::{other_error, BotResult};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

#[tokio::main]
async fn main() -> BotResult<()> {
    let user_id: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| other_error("Usage: get_calendar_token <discord_user_id>"))?;

    // Load configuration
    let config = Arc::new(Config::load()?);

    // Generate random state for security
    let state = format!("{}:{}", user_id, uuid::Uuid::new_v4());
    let auth_url = consent_url(&config, &state)?;

    // Callback server listens where the redirect URI points
    let redirect = Url::parse(&config.google_redirect_uri)
        .map_err(|e| other_error(&format!("Invalid GOOGLE_REDIRECT_URI: {}", e)))?;
    let port = redirect.port_or_known_default().unwrap_or(8080);

    // Open browser for authorization
    println!("Opening browser for Google Calendar authorization...");
    if webbrowser::open(auth_url.as_str()).is_err() {
        println!("Could not open a browser, visit this URL instead:\n{}", auth_url);
    }

    // Start local server to receive the callback
    let server = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|e| other_error(&format!("Failed to start callback server: {}", e)))?;
    println!("Waiting for authorization callback on port {}...", port);

    // Handle the callback
    let request = server.recv()?;
    let callback = redirect
        .join(request.url())
        .map_err(|e| other_error(&format!("Invalid callback URL: {}", e)))?;
    let params: HashMap<String, String> = callback.query_pairs().into_owned().collect();

    if params.get("state") != Some(&state) {
        request.respond(tiny_http::Response::from_string("State mismatch.").with_status_code(400))?;
        return Err(other_error("State mismatch in authorization callback"));
    }

    let code = match params.get("code") {
        Some(code) => code.clone(),
        None => {
            let reason = params
                .get("error")
                .cloned()
                .unwrap_or_else(|| "no authorization code".to_string());
            request.respond(
                tiny_http::Response::from_string("Authorization failed.").with_status_code(400),
            )?;
            return Err(other_error(&format!("Authorization failed: {}", reason)));
        }
    };

    // Exchange code for tokens
    let store = GoogleCredentialStore::new(Arc::clone(&config))?;
    let refresh_token = store.exchange_code(&code).await?;

    // Send success response to browser
    let response =
        tiny_http::Response::from_string("Authorization successful! You can close this window.");
    request.respond(response)?;

    println!("\nAdd this line to your .env file:\n");
    println!("GOOGLE_REFRESH_TOKEN_{}={}", user_id, refresh_token);

    Ok(())
}
