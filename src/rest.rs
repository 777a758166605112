/*!
askdb REST API Server

Answers natural-language questions about a MySQL database or an uploaded CSV
file. Every request carries its own connection descriptor; nothing is kept
between requests apart from the oracle client.

## Usage

```bash
GOOGLE_API_KEY=... askdb-rest --host 0.0.0.0 --port 8000
```

## Endpoints

- `GET /` - Health check
- `POST /schema` - Tables, columns and relationships of a database
- `POST /suggest_questions` - Example questions for a database
- `POST /query` - Answer a question with generated SQL and its result rows
*/

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askdb::config::Settings;
use askdb::query::{QueryPipeline, QueryResult};
use askdb::reader::{resolve, ConnectionDescriptor};
use askdb::schema::{inspect, SchemaSummary};
use askdb::suggest::QuestionSuggester;
use askdb::{AskdbError, Oracle, Reader, VERSION};

/// Detail returned instead of the error message when redaction is on
const REDACTED_DETAIL: &str = "Internal server error";

/// CLI arguments for the REST API server
#[derive(Parser)]
#[command(name = "askdb-rest")]
#[command(about = "askdb REST API Server")]
#[command(version = VERSION)]
struct Cli {
    /// Host address to bind to
    #[arg(long, env = "ASKDB_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind to
    #[arg(long, env = "ASKDB_PORT", default_value = "8000")]
    port: u16,

    /// CORS allowed origins (comma-separated)
    #[arg(long, env = "ASKDB_CORS_ORIGIN", default_value = "*")]
    cors_origin: String,

    /// Hide error messages from clients (they are still logged)
    #[arg(long, env = "ASKDB_REDACT_ERRORS")]
    redact_errors: bool,

    #[command(flatten)]
    settings: Settings,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    oracle: Arc<dyn Oracle>,
    settings: Arc<Settings>,
    redact_errors: bool,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for /query
#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    db_connection: ConnectionDescriptor,
    /// Earlier conversation lines, oldest first
    #[serde(default)]
    history: Vec<String>,
}

/// Request body for /schema and /suggest_questions
#[derive(Debug, Deserialize)]
struct SchemaRequest {
    db_connection: ConnectionDescriptor,
}

#[derive(Debug, Serialize)]
struct SuggestionsResponse {
    questions: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

// ============================================================================
// Error Handling
// ============================================================================

/// Error body: `{"detail": message}`
#[derive(Debug, Serialize)]
struct ApiError {
    detail: String,
}

/// Custom error type for API responses
struct ApiErrorResponse {
    status: StatusCode,
    error: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let json = Json(self.error);
        (self.status, json).into_response()
    }
}

impl AppState {
    /// Log a failed request and turn it into a 500 response
    fn fail(&self, route: &str, err: AskdbError) -> ApiErrorResponse {
        error!("{} failed: {}", route, err);
        let detail = if self.redact_errors {
            REDACTED_DETAIL.to_string()
        } else {
            err.to_string()
        };
        ApiErrorResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError { detail },
        }
    }

    async fn reader(&self, route: &str, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Reader>, ApiErrorResponse> {
        resolve(descriptor, &self.settings.resolver)
            .await
            .map_err(|e| self.fail(route, e))
    }
}

// ============================================================================
// Request Handlers
// ============================================================================

/// GET / - Health check
async fn health_handler() -> Json<HealthResponse> {
    info!("Health check received");
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// POST /schema - Describe tables and relationships
async fn schema_handler(
    State(state): State<AppState>,
    Json(request): Json<SchemaRequest>,
) -> Result<Json<SchemaSummary>, ApiErrorResponse> {
    info!("Schema requested for {} connection", request.db_connection.kind);

    let reader = state.reader("/schema", &request.db_connection).await?;
    let summary = inspect(reader.as_ref()).await;
    reader.close().await;

    summary.map(Json).map_err(|e| state.fail("/schema", e))
}

/// POST /suggest_questions - Example questions for a database
async fn suggest_handler(
    State(state): State<AppState>,
    Json(request): Json<SchemaRequest>,
) -> Result<Json<SuggestionsResponse>, ApiErrorResponse> {
    info!("Suggestions requested for {} connection", request.db_connection.kind);

    let reader = state.reader("/suggest_questions", &request.db_connection).await?;
    let suggester = QuestionSuggester::new(state.oracle.clone());
    let questions = suggester.suggest(reader.as_ref()).await;
    reader.close().await;

    questions
        .map(|questions| Json(SuggestionsResponse { questions }))
        .map_err(|e| state.fail("/suggest_questions", e))
}

/// POST /query - Answer a question with generated SQL
async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ApiErrorResponse> {
    info!("Received query: {}", request.question);

    let reader = state.reader("/query", &request.db_connection).await?;
    let pipeline = QueryPipeline::new(state.oracle.clone(), state.settings.query.clone());
    let result = pipeline
        .answer(&request.question, &request.history, reader.as_ref())
        .await;
    reader.close().await;

    let result = result.map_err(|e| state.fail("/query", e))?;
    info!("Query returned {} rows", result.data.len());
    Ok(Json(result))
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/schema", post(schema_handler))
        .route("/suggest_questions", post(suggest_handler))
        .route("/query", post(query_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    if cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    } else {
        let origins: Vec<_> = cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askdb=info,askdb_rest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    let oracle = cli.settings.oracle.build()?;
    if cli.settings.oracle.api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY is not set; /query will fail and /suggest_questions will fall back");
    }
    info!("Using model {}", oracle.name());

    let state = AppState {
        oracle,
        settings: Arc::new(cli.settings.clone()),
        redact_errors: cli.redact_errors,
    };

    let app = build_router(state).layer(cors_layer(&cli.cors_origin));

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

    info!("Starting askdb REST API server on {}", addr);
    info!("  GET  /                  - Health check");
    info!("  POST /schema            - Describe a database");
    info!("  POST /suggest_questions - Suggest questions");
    info!("  POST /query             - Answer a question");

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
