//! ormrepo HTTP/JSON gateway.
//!
//! Serves the sample member repository over REST: a username lookup by id
//! and a paged, sortable member listing. Repository calls are blocking and
//! run on the blocking thread pool, one session per request.

pub mod config;
pub mod error;
pub mod routes;

pub use config::{Args, GatewayConfig};
pub use error::AppError;

use std::sync::Arc;

use axum::Router;
use ormrepo_core::model::{self, Member, MemberRepository};
use ormrepo_core::{RepositoryConfig, Session, SessionFactory, Sort, StorageConfig};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Opens one session per request.
    pub factory: Arc<SessionFactory>,
    /// Sort applied when a listing request gives none.
    pub default_sort: Sort,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl AppState {
    /// Open the store described by `config`.
    pub fn open(config: GatewayConfig) -> ormrepo_core::Result<Self> {
        let storage = if config.temporary {
            StorageConfig::temporary()
        } else {
            StorageConfig::new(config.data_path.clone())
        };
        let repository = RepositoryConfig::default()
            .with_default_page_size(config.default_page_size)
            .with_max_page_size(config.max_page_size);
        let factory = SessionFactory::open(storage, repository, model::catalog())?;
        Self::new(factory, config)
    }

    /// Create state over an existing factory.
    pub fn new(factory: SessionFactory, config: GatewayConfig) -> ormrepo_core::Result<Self> {
        let default_sort = Sort::parse_params([config.default_sort.as_str()])?;
        Ok(Self {
            factory: Arc::new(factory),
            default_sort,
            config,
        })
    }

    /// Run `f` against a fresh session on the blocking pool.
    pub async fn with_session<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Session) -> ormrepo_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let factory = Arc::clone(&self.factory);
        let result = tokio::task::spawn_blocking(move || {
            let mut session = factory.open_session();
            f(&mut session)
        })
        .await?;
        Ok(result?)
    }
}

/// Insert `member0 .. member{count-1}` with ages `0 .. count-1` unless the
/// store already holds members. Returns how many were inserted.
pub fn seed_members(factory: &SessionFactory, count: usize) -> ormrepo_core::Result<usize> {
    let mut session = factory.open_session();
    if count == 0 || session.repository::<Member>().count()? > 0 {
        return Ok(0);
    }
    session.transaction(|session| {
        let mut members = MemberRepository::new(session);
        for i in 0..count {
            let age = i32::try_from(i).unwrap_or(i32::MAX);
            members.save(&Member::new(format!("member{}", i), age))?;
        }
        Ok(())
    })?;
    info!(count, "seeded sample members");
    Ok(count)
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::members::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
