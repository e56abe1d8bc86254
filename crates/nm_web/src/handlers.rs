use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use nm_core::{
    ArticleFilter, ArticleKey, ArticleSort, Category, Counter, Error, Interaction, SentimentLabel, SentimentResult,
    StoredArticle,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";
const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
/// Request body cap for image uploads; room for a 5 MB image plus multipart framing.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024 + 64 * 1024;

/// JSON `{error}` response with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::CycleInProgress => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_user(headers: &HeaderMap) -> ApiResult<String> {
    user_id(headers).ok_or_else(|| ApiError::bad_request("X-User-Id header is required"))
}

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Page {
    page: u64,
    size: u64,
    offset: u64,
}

impl PageQuery {
    fn resolve(&self) -> ApiResult<Page> {
        let page = self.page.unwrap_or(1).max(1);
        let size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| ApiError::bad_request(format!("Page out of range: {}", page)))?;
        Ok(Page { page, size, offset })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct NewsQuery {
    category: Option<String>,
    sentiment: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    search: Option<String>,
    sort_by: Option<String>,
    page: Option<u64>,
    page_size: Option<u64>,
}

impl NewsQuery {
    fn filter(&self) -> ApiResult<ArticleFilter> {
        let category = non_empty(&self.category)
            .map(Category::from_str)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let sentiments = match non_empty(&self.sentiment) {
            Some(value) => vec![SentimentLabel::from_str(value).map_err(|e| ApiError::bad_request(e.to_string()))?],
            None => Vec::new(),
        };
        Ok(ArticleFilter {
            category,
            sentiments,
            published_from: non_empty(&self.date_from).map(|v| parse_date(v, false)).transpose()?,
            published_to: non_empty(&self.date_to).map(|v| parse_date(v, true)).transpose()?,
            search: non_empty(&self.search).map(str::to_string),
        })
    }

    fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }

    fn sort(&self) -> ApiResult<ArticleSort> {
        match non_empty(&self.sort_by) {
            Some(value) => value.parse().map_err(|e: Error| ApiError::bad_request(e.to_string())),
            None => Ok(ArticleSort::default()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// RFC 3339, or a bare date meaning the start (or end) of that UTC day.
fn parse_date(value: &str, end_of_day: bool) -> ApiResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date: {}", value)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .unwrap_or_default();
    Ok(date.and_time(time).and_utc())
}

#[derive(Debug, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    article: StoredArticle,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_saved: Option<bool>,
}

async fn view(state: &AppState, article: StoredArticle, user: Option<&str>) -> ApiResult<ArticleView> {
    let (is_liked, is_saved) = match user {
        Some(user) => (
            Some(state.store.has_interaction(user, article.id, Interaction::Like).await?),
            Some(state.store.has_interaction(user, article.id, Interaction::Save).await?),
        ),
        None => (None, None),
    };
    Ok(ArticleView {
        article,
        is_liked,
        is_saved,
    })
}

async fn views(state: &AppState, articles: Vec<StoredArticle>, user: Option<&str>) -> ApiResult<Vec<ArticleView>> {
    let mut results = Vec::with_capacity(articles.len());
    for article in articles {
        results.push(view(state, article, user).await?);
    }
    Ok(results)
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    page: u64,
    page_size: u64,
    total_count: u64,
    total_pages: u64,
}

pub async fn list_news(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NewsQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.filter()?;
    let sort = query.sort()?;
    let Page { page, size: page_size, offset } = query.paging().resolve()?;

    let total_count = state.store.count_matching(&filter).await?;
    let articles = state.store.query(&filter, sort, offset, page_size).await?;
    let user = user_id(&headers);
    let results = views(&state, articles, user.as_deref()).await?;
    let pagination = Pagination {
        page,
        page_size,
        total_count,
        total_pages: total_count.div_ceil(page_size),
    };

    Ok(Json(json!({ "results": results, "pagination": pagination })))
}

pub async fn get_news(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let key = ArticleKey::Id(id);
    let mut article = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;

    let user = user_id(&headers);
    if user.is_some() && state.store.increment_counter(&key, Counter::Views, 1).await? {
        article.view_count += 1;
    }
    Ok(Json(view(&state, article, user.as_deref()).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct FetchRequest {
    category: Option<String>,
}

pub async fn fetch_news(
    State(state): State<Arc<AppState>>,
    body: Option<Json<FetchRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let report = state.orchestrator.run_cycle(non_empty(&request.category)).await?;
    Ok(Json(json!({
        "message": format!("Successfully fetched {} new articles", report.saved),
        "saved_count": report.saved,
        "run_id": report.run_id,
    })))
}

async fn toggle(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
    kind: Interaction,
) -> ApiResult<bool> {
    let user = require_user(headers)?;
    Ok(state.store.toggle_interaction(&user, id, kind).await?)
}

pub async fn like_news(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let liked = toggle(&state, &headers, id, Interaction::Like).await?;
    let message = if liked { "Article liked" } else { "Like removed" };
    Ok(Json(json!({ "liked": liked, "message": message })))
}

pub async fn save_news(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let saved = toggle(&state, &headers, id, Interaction::Save).await?;
    let message = if saved { "Article saved" } else { "Article removed from saved" };
    Ok(Json(json!({ "saved": saved, "message": message })))
}

pub async fn saved_news(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(paging): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers)?;
    let Page { page, size: page_size, offset } = paging.resolve()?;
    let articles = state
        .store
        .interacted_articles(&user, Interaction::Save, offset, page_size)
        .await?;
    let results = views(&state, articles, Some(&user)).await?;
    Ok(Json(json!({
        "results": results,
        "page": page,
        "page_size": page_size,
    })))
}

pub async fn categories() -> impl IntoResponse {
    let categories: Vec<_> = Category::ALL
        .iter()
        .map(|c| json!({ "value": c.as_str(), "label": c.label() }))
        .collect();
    Json(json!({ "categories": categories }))
}

pub async fn ingestion_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let scheduler = state.scheduler.as_ref().map(|s| {
        json!({
            "interval_secs": s.interval().as_secs(),
            "last_outcome": s.last_outcome(),
        })
    });
    Json(json!({
        "state": state.orchestrator.state(),
        "last_cycle": state.orchestrator.last_outcome(),
        "scheduler": scheduler,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeRequest {
    text: Option<String>,
}

fn analysis(result: SentimentResult) -> Json<serde_json::Value> {
    Json(json!({ "sentiment": result.label, "confidence": result.confidence }))
}

pub async fn analyze_text(
    State(state): State<Arc<AppState>>,
    body: Option<Json<AnalyzeRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let text = non_empty(&request.text).ok_or_else(|| ApiError::bad_request("text is required"))?;
    let result = state.text.classify(text).await?;
    Ok(analysis(result))
}

#[derive(Debug, Deserialize, Default)]
pub struct AnalyzeImageRequest {
    image_url: Option<String>,
}

/// Accepts a multipart upload in field `image`, or JSON `{image_url}`.
pub async fn analyze_image(State(state): State<Arc<AppState>>, request: Request) -> ApiResult<impl IntoResponse> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("multipart/form-data"));

    let result = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let (bytes, content_type) = read_image_field(&mut multipart).await?;
        state.image.classify_bytes(bytes, &content_type).await?
    } else {
        let Json(body) = Json::<AnalyzeImageRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let url = non_empty(&body.image_url).ok_or_else(|| ApiError::bad_request("No image file provided"))?;
        state.image.classify(url).await?
    };
    Ok(analysis(result))
}

async fn read_image_field(multipart: &mut Multipart) -> ApiResult<(Vec<u8>, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Invalid file type. Allowed: {}",
                IMAGE_EXTENSIONS.join(", ")
            )));
        }
        let content_type = match field.content_type() {
            Some(value) if value.starts_with("image/") => value.to_string(),
            _ if extension == "jpg" => "image/jpeg".to_string(),
            _ => format!("image/{}", extension),
        };
        let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("Image file is empty"));
        }
        return Ok((bytes.to_vec(), content_type));
    }
    Err(ApiError::bad_request("No image file provided"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_resolution() {
        let page = PageQuery::default().resolve().unwrap();
        assert_eq!(page, Page { page: 1, size: 20, offset: 0 });

        let page = PageQuery {
            page: Some(3),
            page_size: Some(500),
        }
        .resolve()
        .unwrap();
        assert_eq!(page, Page { page: 3, size: 100, offset: 200 });

        let page = PageQuery {
            page: Some(0),
            page_size: Some(0),
        }
        .resolve()
        .unwrap();
        assert_eq!(page, Page { page: 1, size: 1, offset: 0 });
    }

    #[test]
    fn test_huge_page_is_rejected() {
        let err = PageQuery {
            page: Some(u64::MAX),
            page_size: Some(20),
        }
        .resolve()
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_date_bounds() {
        let start = parse_date("2024-03-01", false).unwrap();
        let end = parse_date("2024-03-01", true).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(end > start && end < start + chrono::Duration::days(1));
        assert!(parse_date("2024-03-01T10:00:00+02:00", false).is_ok());
        assert!(parse_date("March 1st", false).is_err());
    }
}
