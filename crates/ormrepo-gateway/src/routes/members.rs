//! Member endpoints.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, RawQuery, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};
use ormrepo_core::model::{Member, MemberDto, MemberRepository};
use ormrepo_core::{Page, PageRequest, Sort};
use tracing::debug;

use crate::error::AppError;
use crate::AppState;

/// Member routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/members", get(list_members))
        .route("/members/:id", get(find_member))
        .route("/members2/:id", get(find_member_loaded))
}

/// Username of the member with the given id.
async fn find_member(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<String, AppError> {
    state
        .with_session(move |session| {
            session
                .repository::<Member>()
                .get_by_id(id)
                .map(|member| member.username)
        })
        .await
}

/// Username of a member loaded from the path by the extractor.
async fn find_member_loaded(LoadedMember(member): LoadedMember) -> String {
    member.username
}

/// A member looked up by the `:id` path segment.
pub struct LoadedMember(pub Member);

#[async_trait]
impl FromRequestParts<AppState> for LoadedMember {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let member = state
            .with_session(move |session| session.repository::<Member>().get_by_id(id))
            .await?;
        Ok(Self(member))
    }
}

/// One page of members as DTOs.
async fn list_members(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Page<MemberDto>>, AppError> {
    let params = ListParams::parse(query.as_deref().unwrap_or_default())?;
    let request = params.page_request(&state)?;
    debug!(page = request.page(), size = request.size(), "listing members");

    let page = state
        .with_session(move |session| {
            let page = MemberRepository::new(session).find_all_paged(&request)?;
            Ok(page.map(|member| MemberDto::from(&member)))
        })
        .await?;
    Ok(Json(page))
}

/// `page`, `size` and repeatable `sort` request parameters.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort: Vec<String>,
}

impl ListParams {
    /// Parse a raw query string. Unknown parameters are ignored.
    pub fn parse(query: &str) -> Result<Self, AppError> {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => params.page = Some(parse_number("page", &value)?),
                "size" => params.size = Some(parse_number("size", &value)?),
                "sort" => params.sort.push(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }

    /// Build the page request, falling back to the configured defaults.
    pub fn page_request(&self, state: &AppState) -> Result<PageRequest, AppError> {
        let sort = if self.sort.is_empty() {
            state.default_sort.clone()
        } else {
            Sort::parse_params(&self.sort)?
        };
        let size = self
            .size
            .unwrap_or(i64::from(state.config.default_page_size));
        Ok(PageRequest::of_sorted(self.page.unwrap_or(0), size, sort)?)
    }
}

fn parse_number(name: &str, value: &str) -> Result<i64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("'{}' must be a number, got '{}'", name, value)))
}
