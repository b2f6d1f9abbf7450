use crate::actions::{
    donation_metadata, parse_donation_amount, ActionError, ActionPostRequest, ActionPostResponse,
    ActionRuleSet, ACTION_VERSION,
};
use crate::chain::{ChainClient, SolanaCluster};
use crate::regards::{
    nft_template_by_id, nft_templates, truncate_address, validate_username, Regard, RegardNft,
};
use crate::store::{NewRegard, Store};
use crate::wire::{build_transfer_transaction, encode_transaction_base64, sol_to_lamports, Pubkey};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;
use tower_http::services::{ServeDir, ServeFile};
use url::Url;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SOLANA_CLUSTER: SolanaCluster = SolanaCluster::Devnet;
const DEFAULT_RPC_TIMEOUT_MS: u64 = 6_000;
const DEFAULT_RPC_CONNECT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_DONATION_MAX_SOL: f64 = 100.0;
const DEFAULT_REGARD_MESSAGE_MAX_CHARS: usize = 280;
const DEFAULT_REGARDS_MAX_PAGE_SIZE: usize = 50;
const DEFAULT_REGARDS_PAGE_SIZE: usize = 10;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;
const DEFAULT_CORS_ALLOW_ORIGIN: &str = "*";
const DEFAULT_ACTION_ICON_URL: &str = "/assets/action-icon.svg";
const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

const RPC_TIMEOUT_MS_BOUNDS: (u64, u64) = (100, 120_000);
const RPC_CONNECT_TIMEOUT_MS_BOUNDS: (u64, u64) = (100, 30_000);
const DONATION_MAX_SOL_BOUNDS: (f64, f64) = (0.000_000_001, 100_000.0);
const REGARD_MESSAGE_MAX_CHARS_BOUNDS: (usize, usize) = (1, 10_000);
const REGARDS_MAX_PAGE_SIZE_BOUNDS: (usize, usize) = (1, 500);
const SESSION_TTL_SECONDS_BOUNDS: (u64, u64) = (60, 30 * 86_400);

const REQUEST_ID_HEADER: &str = "x-request-id";
const ACTION_VERSION_HEADER: &str = "x-action-version";
const BLOCKCHAIN_IDS_HEADER: &str = "x-blockchain-ids";

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Debug,
    Info,
}

impl PartialOrd for LogLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(level: LogLevel) -> u8 {
            match level {
                LogLevel::Debug => 0,
                LogLevel::Info => 1,
            }
        }

        rank(*self).cmp(&rank(*other))
    }
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
        }
    }
}

#[derive(Clone)]
struct RuntimeConfig {
    port: u16,
    cluster: SolanaCluster,
    rpc_url: Url,
    rpc_timeout: Duration,
    rpc_connect_timeout: Duration,
    donation_max_sol: f64,
    regard_message_max_chars: usize,
    regards_max_page_size: usize,
    session_ttl_seconds: u64,
    cors_allow_origin: String,
    action_icon_url: String,
    log_level: LogLevel,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let cluster = parse_env_non_empty_string("SOLANA_CLUSTER")
            .and_then(|value| SolanaCluster::parse(&value))
            .unwrap_or(DEFAULT_SOLANA_CLUSTER);
        let rpc_url = parse_env_http_url("SOLANA_RPC_URL").unwrap_or_else(|| {
            Url::parse(cluster.default_rpc_url()).expect("cluster default RPC URL is valid")
        });
        let rpc_timeout_ms = parse_env_u64_with_bounds(
            "SOLANA_RPC_TIMEOUT_MS",
            DEFAULT_RPC_TIMEOUT_MS,
            RPC_TIMEOUT_MS_BOUNDS,
        );
        let rpc_connect_timeout_ms = parse_env_u64_with_bounds(
            "SOLANA_RPC_CONNECT_TIMEOUT_MS",
            DEFAULT_RPC_CONNECT_TIMEOUT_MS,
            RPC_CONNECT_TIMEOUT_MS_BOUNDS,
        );
        let donation_max_sol = parse_env_f64_with_bounds(
            "DONATION_MAX_SOL",
            DEFAULT_DONATION_MAX_SOL,
            DONATION_MAX_SOL_BOUNDS,
        );
        let regard_message_max_chars = parse_env_usize_with_bounds(
            "REGARD_MESSAGE_MAX_CHARS",
            DEFAULT_REGARD_MESSAGE_MAX_CHARS,
            REGARD_MESSAGE_MAX_CHARS_BOUNDS,
        );
        let regards_max_page_size = parse_env_usize_with_bounds(
            "REGARDS_MAX_PAGE_SIZE",
            DEFAULT_REGARDS_MAX_PAGE_SIZE,
            REGARDS_MAX_PAGE_SIZE_BOUNDS,
        );
        let session_ttl_seconds = parse_env_u64_with_bounds(
            "SESSION_TTL_SECONDS",
            DEFAULT_SESSION_TTL_SECONDS,
            SESSION_TTL_SECONDS_BOUNDS,
        );
        let cors_allow_origin = parse_env_non_empty_string("CORS_ALLOW_ORIGIN")
            .unwrap_or_else(|| DEFAULT_CORS_ALLOW_ORIGIN.to_string());
        let action_icon_url = parse_env_non_empty_string("ACTION_ICON_URL")
            .unwrap_or_else(|| DEFAULT_ACTION_ICON_URL.to_string());
        let log_level = parse_log_level("LOG_LEVEL", DEFAULT_LOG_LEVEL);

        Self {
            port,
            cluster,
            rpc_url,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            rpc_connect_timeout: Duration::from_millis(rpc_connect_timeout_ms),
            donation_max_sol,
            regard_message_max_chars,
            regards_max_page_size,
            session_ttl_seconds,
            cors_allow_origin,
            action_icon_url,
            log_level,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
    chain: Arc<ChainClient>,
    config: RuntimeConfig,
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env();
    let chain = ChainClient::new(
        config.rpc_url.clone(),
        config.rpc_timeout,
        config.rpc_connect_timeout,
    )?;
    let store = Store::with_seed_data(now_unix_seconds());

    let state = AppState {
        store: Arc::new(RwLock::new(store)),
        chain: Arc::new(chain),
        config: config.clone(),
    };

    log_event(
        &config,
        LogLevel::Info,
        "server_start",
        serde_json::json!({
            "port": config.port,
            "cluster": config.cluster.as_str(),
            "rpc_host": state.chain.rpc_host(),
        }),
    );

    let static_service = ServeDir::new("dist").not_found_service(ServeFile::new("dist/index.html"));

    let app = Router::new()
        .route("/actions.json", get(get_actions_json).options(actions_preflight))
        .route(
            "/api/actions/{username}/donate-sol",
            get(get_donate_action)
                .post(post_donate_action)
                .options(actions_preflight),
        )
        .route("/api/health", get(get_health))
        .route("/api/auth/nonce", post(post_auth_nonce))
        .route("/api/auth/verify", post(post_auth_verify))
        .route("/api/auth/logout", post(post_auth_logout))
        .route("/api/users/check-username", get(get_check_username))
        .route(
            "/api/users/profile",
            get(get_own_profile).post(post_create_profile).put(put_update_profile),
        )
        .route("/api/users/{username}", get(get_public_profile))
        .route("/api/regards/send", post(post_send_regard))
        .route("/api/regards/{username}", get(get_regards_page))
        .route("/api/regards/{username}/stats", get(get_regard_stats))
        .route("/api/nft/templates", get(get_nft_templates))
        .route("/api/nft/metadata", post(post_nft_metadata))
        .fallback_service(static_service)
        .with_state(state);

    let bind_address = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    println!("server listening on http://127.0.0.1:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------- response plumbing ----------

/// The blinks CORS header set; action endpoints (errors and preflights
/// included) must always carry it so wallet clients can call cross-origin.
fn action_headers(config: &RuntimeConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,PUT,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, Content-Encoding, Accept-Encoding"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("x-action-version, x-blockchain-ids"),
    );
    headers.insert(ACTION_VERSION_HEADER, HeaderValue::from_static(ACTION_VERSION));
    headers.insert(
        BLOCKCHAIN_IDS_HEADER,
        HeaderValue::from_static(config.cluster.caip2_id()),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers
}

fn action_json(
    status: StatusCode,
    payload: impl Serialize,
    config: &RuntimeConfig,
    request_id: &str,
) -> axum::response::Response {
    response_with_request_id(status, action_headers(config), Json(payload), request_id)
}

fn api_json(
    status: StatusCode,
    payload: impl Serialize,
    config: &RuntimeConfig,
    request_id: &str,
) -> axum::response::Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(origin) = HeaderValue::from_str(&config.cors_allow_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response_with_request_id(status, headers, Json(payload), request_id)
}

fn api_error(
    status: StatusCode,
    message: &str,
    config: &RuntimeConfig,
    request_id: &str,
) -> axum::response::Response {
    api_json(status, serde_json::json!({ "error": message }), config, request_id)
}

fn response_with_request_id(
    status: StatusCode,
    mut headers: HeaderMap,
    payload: impl IntoResponse,
    request_id: &str,
) -> axum::response::Response {
    if let Ok(request_id_header) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, request_id_header);
    }
    (status, headers, payload).into_response()
}

// ---------- env parsing ----------

fn parse_env_u64_with_bounds(name: &str, default: u64, bounds: (u64, u64)) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| (bounds.0..=bounds.1).contains(value))
        .unwrap_or(default)
}

fn parse_env_usize_with_bounds(name: &str, default: usize, bounds: (usize, usize)) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| (bounds.0..=bounds.1).contains(value))
        .unwrap_or(default)
}

fn parse_env_f64_with_bounds(name: &str, default: f64, bounds: (f64, f64)) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && (bounds.0..=bounds.1).contains(value))
        .unwrap_or(default)
}

fn parse_env_non_empty_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env_http_url(name: &str) -> Option<Url> {
    let value = parse_env_non_empty_string(name)?;
    let parsed = Url::parse(&value).ok()?;

    if parsed.scheme() == "http" || parsed.scheme() == "https" {
        Some(parsed)
    } else {
        None
    }
}

fn parse_log_level(name: &str, default: LogLevel) -> LogLevel {
    match parse_env_non_empty_string(name)
        .unwrap_or_else(|| default.as_str().to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        _ => default,
    }
}

// ---------- logging and request ids ----------

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis())
        .unwrap_or(0)
}

fn generate_request_id() -> String {
    let counter = REQUEST_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    format!("req-{}-{counter}", now_unix_millis())
}

fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|raw| raw.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(generate_request_id)
}

fn log_event(config: &RuntimeConfig, level: LogLevel, event: &str, fields: serde_json::Value) {
    if level < config.log_level {
        return;
    }

    let mut payload = serde_json::Map::new();
    payload.insert(
        "ts".to_string(),
        serde_json::Value::Number(serde_json::Number::from(now_unix_seconds())),
    );
    payload.insert(
        "level".to_string(),
        serde_json::Value::String(level.as_str().to_string()),
    );
    payload.insert("event".to_string(), serde_json::Value::String(event.to_string()));

    if let serde_json::Value::Object(extra) = fields {
        for (key, value) in extra {
            payload.insert(key, value);
        }
    }

    println!("{}", serde_json::Value::Object(payload));
}

fn log_request_start(config: &RuntimeConfig, request_id: &str, area: &str, path: &str) {
    log_event(
        config,
        LogLevel::Debug,
        &format!("{area}_request_start"),
        serde_json::json!({ "request_id": request_id, "path": path }),
    );
}

fn log_request_complete(
    config: &RuntimeConfig,
    request_id: &str,
    area: &str,
    status: StatusCode,
    started_at: Instant,
) {
    log_event(
        config,
        LogLevel::Info,
        &format!("{area}_request_complete"),
        serde_json::json!({
            "request_id": request_id,
            "status": status.as_u16(),
            "duration_ms": started_at.elapsed().as_millis(),
        }),
    );
}

fn log_request_failed(
    config: &RuntimeConfig,
    request_id: &str,
    area: &str,
    error_class: &str,
    message: &str,
    started_at: Instant,
) {
    log_event(
        config,
        LogLevel::Info,
        &format!("{area}_request_failed"),
        serde_json::json!({
            "request_id": request_id,
            "error_class": error_class,
            "message": message,
            "duration_ms": started_at.elapsed().as_millis(),
        }),
    );
}

// ---------- auth ----------

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let authorization = headers.get(header::AUTHORIZATION)?;
    let value = authorization.to_str().ok()?;
    let prefix = "Bearer ";

    if !value.starts_with(prefix) {
        return None;
    }

    Some(value[prefix.len()..].trim())
}

/// Resolves the session wallet behind the bearer token, or the 401 response
/// to return as-is.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    request_id: &str,
) -> Result<String, axum::response::Response> {
    let Some(token) = read_bearer_token(headers).filter(|token| !token.is_empty()) else {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing bearer token",
            &state.config,
            request_id,
        ));
    };

    let wallet = state.store.read().await.session_wallet(token, now_unix_seconds());
    wallet.ok_or_else(|| {
        api_error(
            StatusCode::UNAUTHORIZED,
            "invalid or expired token",
            &state.config,
            request_id,
        )
    })
}

// ---------- request/response bodies ----------

#[derive(Deserialize)]
struct DonateQuery {
    amount: Option<String>,
}

#[derive(Deserialize)]
struct CheckUsernameQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NonceRequest {
    wallet_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    wallet_address: String,
    signature: String,
    nonce: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProfileRequest {
    username: String,
    display_name: Option<String>,
    bio: Option<String>,
    profile_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    display_name: Option<String>,
    bio: Option<String>,
    profile_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRegardRequest {
    recipient_username: String,
    amount: f64,
    message: String,
    transaction_signature: String,
    nft_template: Option<String>,
}

#[derive(Deserialize)]
struct NftMetadataRequest {
    template: String,
    amount: f64,
    sender: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegardsPageResponse {
    regards: Vec<Regard>,
    total: usize,
    limit: usize,
    offset: usize,
}

// ---------- actions ----------

async fn actions_preflight(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);
    response_with_request_id(StatusCode::OK, action_headers(&state.config), "", &request_id)
}

async fn get_actions_json(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);
    action_json(StatusCode::OK, ActionRuleSet::profile_rules(), &state.config, &request_id)
}

async fn get_donate_action(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "action_metadata", uri.path());

    let recipient = { state.store.read().await.user_by_username(&username).cloned() };
    let Some(recipient) = recipient else {
        log_request_failed(
            &state.config,
            &request_id,
            "action_metadata",
            "unknown_user",
            "no profile for username",
            started_at,
        );
        return action_json(
            StatusCode::NOT_FOUND,
            ActionError::new("no DropRegards profile with that username"),
            &state.config,
            &request_id,
        );
    };

    let icon = donation_icon(&recipient.profile_image, &state.config.action_icon_url);
    let metadata = donation_metadata(&recipient.username, &recipient.display_name, icon);

    log_request_complete(&state.config, &request_id, "action_metadata", StatusCode::OK, started_at);
    action_json(StatusCode::OK, metadata, &state.config, &request_id)
}

async fn post_donate_action(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Path(username): Path<String>,
    Query(query): Query<DonateQuery>,
    Json(body): Json<ActionPostRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "donate", uri.path());

    let recipient = { state.store.read().await.user_by_username(&username).cloned() };
    let Some(recipient) = recipient else {
        log_request_failed(&state.config, &request_id, "donate", "unknown_user", "no profile", started_at);
        return action_json(
            StatusCode::NOT_FOUND,
            ActionError::new("no DropRegards profile with that username"),
            &state.config,
            &request_id,
        );
    };

    let amount = match parse_donation_amount(query.amount.as_deref(), state.config.donation_max_sol) {
        Ok(amount) => amount,
        Err(error) => {
            log_request_failed(
                &state.config,
                &request_id,
                "donate",
                error.error_class(),
                &error.to_string(),
                started_at,
            );
            return action_json(
                StatusCode::BAD_REQUEST,
                ActionError::new(&error.to_string()),
                &state.config,
                &request_id,
            );
        }
    };

    let payer: Pubkey = match body.account.parse() {
        Ok(key) => key,
        Err(_) => {
            log_request_failed(
                &state.config,
                &request_id,
                "donate",
                "account_invalid",
                "account is not a valid public key",
                started_at,
            );
            return action_json(
                StatusCode::BAD_REQUEST,
                ActionError::new("account is not a valid public key"),
                &state.config,
                &request_id,
            );
        }
    };

    let recipient_key: Pubkey = match recipient.wallet_address.parse() {
        Ok(key) => key,
        Err(_) => {
            // Stored wallets were validated on profile creation; a failure
            // here is a data bug, not a caller error.
            log_request_failed(
                &state.config,
                &request_id,
                "donate",
                "recipient_key_invalid",
                "stored recipient wallet failed to parse",
                started_at,
            );
            return action_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                ActionError::new("something went wrong, try again later"),
                &state.config,
                &request_id,
            );
        }
    };

    if payer == recipient_key {
        log_request_failed(&state.config, &request_id, "donate", "self_donation", "payer is recipient", started_at);
        return action_json(
            StatusCode::BAD_REQUEST,
            ActionError::new("you cannot send a donation to yourself"),
            &state.config,
            &request_id,
        );
    }

    let lamports = match sol_to_lamports(amount) {
        Ok(lamports) => lamports,
        Err(_) => {
            log_request_failed(
                &state.config,
                &request_id,
                "donate",
                "amount_sub_lamport",
                "below one lamport",
                started_at,
            );
            return action_json(
                StatusCode::BAD_REQUEST,
                ActionError::new("amount is below one lamport"),
                &state.config,
                &request_id,
            );
        }
    };

    let blockhash = match state.chain.latest_blockhash().await {
        Ok(latest) => latest.blockhash,
        Err(error) => {
            log_request_failed(
                &state.config,
                &request_id,
                "donate",
                error.error_class(),
                &error.to_string(),
                started_at,
            );
            return action_json(
                StatusCode::BAD_GATEWAY,
                ActionError::new("unable to reach the Solana network, try again later"),
                &state.config,
                &request_id,
            );
        }
    };

    let transaction = match build_transfer_transaction(&payer, &recipient_key, lamports, &blockhash) {
        Ok(bytes) => bytes,
        Err(error) => {
            log_request_failed(&state.config, &request_id, "donate", "build_failed", &error.to_string(), started_at);
            return action_json(
                StatusCode::BAD_REQUEST,
                ActionError::new(&error.to_string()),
                &state.config,
                &request_id,
            );
        }
    };

    let response = ActionPostResponse::unsigned(
        encode_transaction_base64(&transaction),
        format!("Send {amount} SOL to {}", recipient.display_name),
    );

    log_event(
        &state.config,
        LogLevel::Info,
        "donate_transaction_built",
        serde_json::json!({
            "request_id": request_id,
            "recipient": recipient.username,
            "lamports": lamports,
        }),
    );
    log_request_complete(&state.config, &request_id, "donate", StatusCode::OK, started_at);
    action_json(StatusCode::OK, response, &state.config, &request_id)
}

// ---------- health ----------

async fn get_health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);
    api_json(
        StatusCode::OK,
        serde_json::json!({
            "message": "DropRegards API is running",
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        }),
        &state.config,
        &request_id,
    )
}

// ---------- auth endpoints ----------

async fn post_auth_nonce(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<NonceRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "auth_nonce", uri.path());

    if body.wallet_address.parse::<Pubkey>().is_err() {
        log_request_failed(&state.config, &request_id, "auth_nonce", "wallet_invalid", "bad wallet address", started_at);
        return api_error(StatusCode::BAD_REQUEST, "invalid wallet address", &state.config, &request_id);
    }

    let (nonce, expires_in) = {
        let mut store = state.store.write().await;
        store.issue_nonce(&body.wallet_address, now_unix_millis() as u64)
    };

    log_request_complete(&state.config, &request_id, "auth_nonce", StatusCode::OK, started_at);
    api_json(
        StatusCode::OK,
        serde_json::json!({ "nonce": nonce, "expiresIn": expires_in }),
        &state.config,
        &request_id,
    )
}

async fn post_auth_verify(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<VerifyRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "auth_verify", uri.path());

    if body.wallet_address.parse::<Pubkey>().is_err() {
        log_request_failed(&state.config, &request_id, "auth_verify", "wallet_invalid", "bad wallet address", started_at);
        return api_error(StatusCode::BAD_REQUEST, "invalid wallet address", &state.config, &request_id);
    }

    // Signature verification is mocked: any non-empty signature passes.
    if body.signature.trim().is_empty() {
        log_request_failed(&state.config, &request_id, "auth_verify", "signature_missing", "empty signature", started_at);
        return api_error(StatusCode::BAD_REQUEST, "signature is required", &state.config, &request_id);
    }

    let now_secs = now_unix_seconds();
    let nonce_ok = {
        let mut store = state.store.write().await;
        store.consume_nonce(&body.wallet_address, body.nonce.as_deref(), now_secs)
    };
    if !nonce_ok {
        log_request_failed(&state.config, &request_id, "auth_verify", "nonce_invalid", "stale or unknown nonce", started_at);
        return api_error(StatusCode::UNAUTHORIZED, "invalid or expired nonce", &state.config, &request_id);
    }

    let (token, user) = {
        let mut store = state.store.write().await;
        let token = store.issue_session(&body.wallet_address, state.config.session_ttl_seconds, now_secs);
        let user = store.user_by_wallet(&body.wallet_address).cloned();
        (token, user)
    };

    log_request_complete(&state.config, &request_id, "auth_verify", StatusCode::OK, started_at);
    api_json(
        StatusCode::OK,
        serde_json::json!({
            "token": token,
            "user": {
                "walletAddress": body.wallet_address,
                "hasProfile": user.is_some(),
                "username": user.map(|profile| profile.username),
            },
        }),
        &state.config,
        &request_id,
    )
}

async fn post_auth_logout(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "auth_logout", uri.path());

    let Some(token) = read_bearer_token(&headers).filter(|token| !token.is_empty()) else {
        log_request_failed(&state.config, &request_id, "auth_logout", "token_missing", "no bearer token", started_at);
        return api_error(StatusCode::UNAUTHORIZED, "missing bearer token", &state.config, &request_id);
    };

    let token = token.to_string();
    state.store.write().await.revoke_session(&token);

    log_request_complete(&state.config, &request_id, "auth_logout", StatusCode::OK, started_at);
    api_json(StatusCode::OK, serde_json::json!({ "success": true }), &state.config, &request_id)
}

// ---------- users ----------

async fn get_check_username(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CheckUsernameQuery>,
) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);

    let Some(username) = query
        .username
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return api_error(StatusCode::BAD_REQUEST, "username is required", &state.config, &request_id);
    };

    if let Err(error) = validate_username(username) {
        return api_error(StatusCode::BAD_REQUEST, &error.to_string(), &state.config, &request_id);
    }

    let available = state.store.read().await.username_available(username);
    api_json(
        StatusCode::OK,
        serde_json::json!({ "username": username, "available": available }),
        &state.config,
        &request_id,
    )
}

async fn post_create_profile(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<CreateProfileRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "profile_create", uri.path());

    let wallet = match authenticate(&state, &headers, &request_id).await {
        Ok(wallet) => wallet,
        Err(response) => return response,
    };

    if let Err(error) = validate_username(&body.username) {
        log_request_failed(&state.config, &request_id, "profile_create", "username_invalid", &error.to_string(), started_at);
        return api_error(StatusCode::BAD_REQUEST, &error.to_string(), &state.config, &request_id);
    }

    let created = state.store.write().await.create_profile(
        &wallet,
        &body.username,
        body.display_name.as_deref(),
        body.bio.as_deref(),
        body.profile_image.as_deref(),
        now_unix_seconds(),
    );

    match created {
        Ok(profile) => {
            log_request_complete(&state.config, &request_id, "profile_create", StatusCode::CREATED, started_at);
            api_json(StatusCode::CREATED, profile, &state.config, &request_id)
        }
        Err(error) => {
            log_request_failed(&state.config, &request_id, "profile_create", "conflict", &error.to_string(), started_at);
            api_error(StatusCode::CONFLICT, &error.to_string(), &state.config, &request_id)
        }
    }
}

async fn get_own_profile(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);

    let wallet = match authenticate(&state, &headers, &request_id).await {
        Ok(wallet) => wallet,
        Err(response) => return response,
    };

    let profile = { state.store.read().await.user_by_wallet(&wallet).cloned() };
    match profile {
        Some(profile) => api_json(StatusCode::OK, profile, &state.config, &request_id),
        None => api_error(StatusCode::NOT_FOUND, "no profile for this wallet", &state.config, &request_id),
    }
}

async fn put_update_profile(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "profile_update", uri.path());

    let wallet = match authenticate(&state, &headers, &request_id).await {
        Ok(wallet) => wallet,
        Err(response) => return response,
    };

    let updated = state.store.write().await.update_profile(
        &wallet,
        body.display_name.as_deref(),
        body.bio.as_deref(),
        body.profile_image.as_deref(),
    );

    match updated {
        Some(profile) => {
            log_request_complete(&state.config, &request_id, "profile_update", StatusCode::OK, started_at);
            api_json(StatusCode::OK, profile, &state.config, &request_id)
        }
        None => {
            log_request_failed(&state.config, &request_id, "profile_update", "profile_missing", "no profile for wallet", started_at);
            api_error(StatusCode::NOT_FOUND, "no profile for this wallet", &state.config, &request_id)
        }
    }
}

async fn get_public_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);

    let profile = { state.store.read().await.user_by_username(&username).cloned() };
    match profile {
        Some(profile) => api_json(StatusCode::OK, profile, &state.config, &request_id),
        None => api_error(StatusCode::NOT_FOUND, "no profile with that username", &state.config, &request_id),
    }
}

// ---------- regards ----------

async fn post_send_regard(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<SendRegardRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "regard_send", uri.path());

    let wallet = match authenticate(&state, &headers, &request_id).await {
        Ok(wallet) => wallet,
        Err(response) => return response,
    };

    if !(body.amount.is_finite() && body.amount > 0.0 && body.amount <= state.config.donation_max_sol) {
        log_request_failed(&state.config, &request_id, "regard_send", "amount_invalid", "amount out of range", started_at);
        return api_error(StatusCode::BAD_REQUEST, "invalid amount", &state.config, &request_id);
    }

    let message = body.message.trim();
    if message.is_empty() {
        log_request_failed(&state.config, &request_id, "regard_send", "message_missing", "empty message", started_at);
        return api_error(StatusCode::BAD_REQUEST, "message is required", &state.config, &request_id);
    }
    if message.chars().count() > state.config.regard_message_max_chars {
        log_request_failed(&state.config, &request_id, "regard_send", "message_too_long", "over the character limit", started_at);
        return api_error(StatusCode::BAD_REQUEST, "message is too long", &state.config, &request_id);
    }

    if body.transaction_signature.trim().is_empty() {
        log_request_failed(&state.config, &request_id, "regard_send", "signature_missing", "empty signature", started_at);
        return api_error(
            StatusCode::BAD_REQUEST,
            "transaction signature is required",
            &state.config,
            &request_id,
        );
    }

    let nft = match body.nft_template.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(template_id) => match nft_template_by_id(template_id) {
            Some(template) => Some(RegardNft {
                name: template.name,
                image: template.image,
                mint: format!("mock-mint-{template_id}-{}", now_unix_millis()),
            }),
            None => {
                log_request_failed(&state.config, &request_id, "regard_send", "template_unknown", template_id, started_at);
                return api_error(StatusCode::BAD_REQUEST, "unknown NFT template", &state.config, &request_id);
            }
        },
        None => None,
    };

    let mut store = state.store.write().await;

    let Some(recipient) = store.user_by_username(&body.recipient_username).cloned() else {
        drop(store);
        log_request_failed(
            &state.config,
            &request_id,
            "regard_send",
            "unknown_recipient",
            &body.recipient_username,
            started_at,
        );
        return api_error(StatusCode::NOT_FOUND, "no profile with that username", &state.config, &request_id);
    };

    let sender = store
        .user_by_wallet(&wallet)
        .map(|profile| profile.display_name.clone())
        .unwrap_or_else(|| truncate_address(&wallet));

    let stored = store.append_regard(
        NewRegard {
            sender,
            sender_wallet: wallet,
            recipient_username: recipient.username,
            amount: body.amount,
            message: message.to_string(),
            transaction_signature: body.transaction_signature.trim().to_string(),
            nft,
        },
        now_unix_seconds(),
    );
    drop(store);

    log_event(
        &state.config,
        LogLevel::Info,
        "regard_stored",
        serde_json::json!({
            "request_id": request_id,
            "regard_id": stored.id,
            "recipient": stored.recipient_username,
            "has_nft": stored.nft.is_some(),
        }),
    );
    log_request_complete(&state.config, &request_id, "regard_send", StatusCode::CREATED, started_at);
    api_json(StatusCode::CREATED, stored, &state.config, &request_id)
}

async fn get_regards_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);

    let store = state.store.read().await;
    if store.user_by_username(&username).is_none() {
        drop(store);
        return api_error(StatusCode::NOT_FOUND, "no profile with that username", &state.config, &request_id);
    }

    let limit = clamp_page_limit(query.limit, state.config.regards_max_page_size);
    let offset = query.offset.unwrap_or(0);
    let (regards, total) = store.regards_page(&username, limit, offset);
    drop(store);

    api_json(
        StatusCode::OK,
        RegardsPageResponse {
            regards,
            total,
            limit,
            offset,
        },
        &state.config,
        &request_id,
    )
}

async fn get_regard_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);

    let store = state.store.read().await;
    if store.user_by_username(&username).is_none() {
        drop(store);
        return api_error(StatusCode::NOT_FOUND, "no profile with that username", &state.config, &request_id);
    }

    let stats = store.stats_for(&username);
    drop(store);

    api_json(StatusCode::OK, stats, &state.config, &request_id)
}

// ---------- nft ----------

async fn get_nft_templates(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = resolve_request_id(&headers);
    api_json(
        StatusCode::OK,
        serde_json::json!({ "templates": nft_templates() }),
        &state.config,
        &request_id,
    )
}

async fn post_nft_metadata(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<NftMetadataRequest>,
) -> impl IntoResponse {
    let started_at = Instant::now();
    let request_id = resolve_request_id(&headers);
    log_request_start(&state.config, &request_id, "nft_metadata", uri.path());

    if let Err(response) = authenticate(&state, &headers, &request_id).await {
        return response;
    }

    match nft_metadata_json(&body.template, body.amount, body.sender.as_deref(), now_unix_seconds()) {
        Some(metadata) => {
            log_request_complete(&state.config, &request_id, "nft_metadata", StatusCode::OK, started_at);
            api_json(StatusCode::OK, metadata, &state.config, &request_id)
        }
        None => {
            log_request_failed(&state.config, &request_id, "nft_metadata", "template_unknown", &body.template, started_at);
            api_error(StatusCode::BAD_REQUEST, "unknown NFT template", &state.config, &request_id)
        }
    }
}

// ---------- pure helpers ----------

fn donation_icon<'a>(profile_image: &'a str, fallback: &'a str) -> &'a str {
    if profile_image.trim().is_empty() {
        fallback
    } else {
        profile_image
    }
}

fn clamp_page_limit(requested: Option<usize>, max: usize) -> usize {
    requested.unwrap_or(DEFAULT_REGARDS_PAGE_SIZE).clamp(1, max)
}

/// Deterministic mint metadata for a template; minting itself stays mocked.
fn nft_metadata_json(
    template_id: &str,
    amount: f64,
    sender: Option<&str>,
    now_secs: u64,
) -> Option<serde_json::Value> {
    let template = nft_template_by_id(template_id)?;

    Some(serde_json::json!({
        "name": format!("DropRegards: {}", template.name),
        "symbol": "REGARD",
        "description": template.description,
        "image": template.image,
        "attributes": [
            { "trait_type": "Template", "value": template.name },
            { "trait_type": "Amount", "value": format!("{amount} SOL") },
            { "trait_type": "Sender", "value": sender.unwrap_or("Anonymous") },
            { "trait_type": "Date", "value": unix_date_string(now_secs) },
        ],
    }))
}

// Civil-from-days conversion; good for any unix timestamp we will ever see.
fn unix_date_string(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            port: DEFAULT_PORT,
            cluster: SolanaCluster::Devnet,
            rpc_url: Url::parse("https://api.devnet.solana.com").expect("valid url"),
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            rpc_connect_timeout: Duration::from_millis(DEFAULT_RPC_CONNECT_TIMEOUT_MS),
            donation_max_sol: DEFAULT_DONATION_MAX_SOL,
            regard_message_max_chars: DEFAULT_REGARD_MESSAGE_MAX_CHARS,
            regards_max_page_size: DEFAULT_REGARDS_MAX_PAGE_SIZE,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cors_allow_origin: DEFAULT_CORS_ALLOW_ORIGIN.to_string(),
            action_icon_url: DEFAULT_ACTION_ICON_URL.to_string(),
            log_level: DEFAULT_LOG_LEVEL,
        }
    }

    #[test]
    fn action_headers_advertise_version_and_chain() {
        let headers = action_headers(&test_config());

        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert_eq!(
            headers.get(ACTION_VERSION_HEADER).and_then(|v| v.to_str().ok()),
            Some(ACTION_VERSION)
        );
        assert_eq!(
            headers.get(BLOCKCHAIN_IDS_HEADER).and_then(|v| v.to_str().ok()),
            Some(SolanaCluster::Devnet.caip2_id())
        );
        assert!(headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).is_some());
    }

    #[test]
    fn bearer_token_parsing_requires_the_scheme_prefix() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer drt-1-abc"));
        assert_eq!(read_bearer_token(&headers), Some("drt-1-abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(read_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   spaced  "));
        assert_eq!(read_bearer_token(&headers), Some("spaced"));
    }

    #[test]
    fn page_limit_clamps_into_the_configured_window() {
        assert_eq!(clamp_page_limit(None, 50), DEFAULT_REGARDS_PAGE_SIZE);
        assert_eq!(clamp_page_limit(Some(0), 50), 1);
        assert_eq!(clamp_page_limit(Some(25), 50), 25);
        assert_eq!(clamp_page_limit(Some(999), 50), 50);
    }

    #[test]
    fn donation_icon_prefers_the_profile_image() {
        assert_eq!(
            donation_icon("https://img.example/a.png", "/fallback.svg"),
            "https://img.example/a.png"
        );
        assert_eq!(donation_icon("", "/fallback.svg"), "/fallback.svg");
        assert_eq!(donation_icon("   ", "/fallback.svg"), "/fallback.svg");
    }

    #[test]
    fn unix_dates_render_as_iso_days() {
        assert_eq!(unix_date_string(0), "1970-01-01");
        assert_eq!(unix_date_string(86_399), "1970-01-01");
        assert_eq!(unix_date_string(86_400), "1970-01-02");
        // 2024-02-29 00:00:00 UTC, a leap day.
        assert_eq!(unix_date_string(1_709_164_800), "2024-02-29");
        // 2023-11-14 22:13:20 UTC.
        assert_eq!(unix_date_string(1_700_000_000), "2023-11-14");
    }

    #[test]
    fn nft_metadata_carries_template_attributes() {
        let metadata = nft_metadata_json("gratitude", 0.05, Some("Dana"), 1_700_000_000)
            .expect("known template builds");

        assert_eq!(metadata["name"], "DropRegards: Gratitude");
        assert_eq!(metadata["symbol"], "REGARD");
        assert_eq!(metadata["attributes"][0]["value"], "Gratitude");
        assert_eq!(metadata["attributes"][1]["value"], "0.05 SOL");
        assert_eq!(metadata["attributes"][2]["value"], "Dana");
        assert_eq!(metadata["attributes"][3]["value"], "2023-11-14");

        let anonymous = nft_metadata_json("star", 1.0, None, 0).expect("known template builds");
        assert_eq!(anonymous["attributes"][2]["value"], "Anonymous");

        assert!(nft_metadata_json("unknown", 1.0, None, 0).is_none());
    }

    #[test]
    fn env_parsing_falls_back_on_bad_values() {
        assert_eq!(parse_env_u64_with_bounds("DR_TEST_UNSET_U64", 7, (1, 10)), 7);
        assert_eq!(parse_env_f64_with_bounds("DR_TEST_UNSET_F64", 1.5, (0.1, 10.0)), 1.5);
        assert_eq!(parse_env_non_empty_string("DR_TEST_UNSET_STR"), None);
        assert!(parse_env_http_url("DR_TEST_UNSET_URL").is_none());
    }
}
