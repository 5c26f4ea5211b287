use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use common::db::repositories::submission::SubmissionPage;
use common::db::repositories::SubmissionFilter;
use common::lead_form::{embed_code, slugify, EmbedKind, SubmitResponse};
use common::models::{AuthUser, LeadForm, LeadFormInput, SubmissionMeta};
use common::validation::require_non_empty;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handlers::{Created, ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EmbedQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbedCode {
    pub kind: EmbedKind,
    pub code: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UtmQuery {
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_medium: Option<String>,
}

fn embed_kind(raw: Option<&str>) -> Result<EmbedKind, ErrorResponse> {
    match raw.unwrap_or("iframe") {
        "iframe" => Ok(EmbedKind::Iframe),
        "script" => Ok(EmbedKind::Script),
        other => Err(ErrorResponse::validation(format!(
            "Unknown embed type '{}', expected iframe or script",
            other
        ))),
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header(headers, "x-real-ip"))
}

fn submission_meta(headers: &HeaderMap, utm: UtmQuery) -> SubmissionMeta {
    SubmissionMeta {
        ip_address: client_ip(headers),
        user_agent: header(headers, "user-agent"),
        referrer: header(headers, "referer"),
        utm_source: utm.utm_source,
        utm_campaign: utm.utm_campaign,
        utm_medium: utm.utm_medium,
    }
}

async fn check_business(
    state: &AppState,
    user_id: i64,
    input: &LeadFormInput,
) -> Result<(), ErrorResponse> {
    if let Some(business_id) = input.business_id {
        state
            .businesses()
            .find(user_id, business_id)
            .await?
            .ok_or_else(|| ErrorResponse::not_found("Business"))?;
    }
    Ok(())
}

async fn owned_form(state: &AppState, user_id: i64, id: i64) -> Result<LeadForm, ErrorResponse> {
    state
        .lead_forms()
        .find(user_id, id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Lead form"))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_forms(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SuccessResponse<Vec<LeadForm>>>, ErrorResponse> {
    let forms = state.lead_forms().list(user.id).await?;
    Ok(Json(SuccessResponse::new(forms)))
}

#[tracing::instrument(skip(state, user, input), fields(user_id = user.id))]
pub async fn create_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<LeadFormInput>,
) -> Result<Created<LeadForm>, ErrorResponse> {
    require_non_empty("name", &input.name)?;
    check_business(&state, user.id, &input).await?;

    let repo = state.lead_forms();
    let slug = repo.unique_slug(&slugify(&input.name), None).await?;
    let form = repo.create(user.id, &slug, &input).await?;
    Ok(Created(form))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<LeadForm>>, ErrorResponse> {
    let form = owned_form(&state, user.id, id).await?;
    Ok(Json(SuccessResponse::new(form)))
}

#[tracing::instrument(skip(state, user, input), fields(user_id = user.id))]
pub async fn update_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<LeadFormInput>,
) -> Result<Json<SuccessResponse<LeadForm>>, ErrorResponse> {
    require_non_empty("name", &input.name)?;
    check_business(&state, user.id, &input).await?;

    let repo = state.lead_forms();
    let current = owned_form(&state, user.id, id).await?;
    let slug = if current.name.trim() == input.name.trim() {
        current.slug
    } else {
        repo.unique_slug(&slugify(&input.name), Some(id)).await?
    };

    let form = repo.update(user.id, id, &slug, &input).await?;
    Ok(Json(SuccessResponse::new(form)))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn delete_form(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<()>>, ErrorResponse> {
    state.lead_forms().delete(user.id, id).await?;
    Ok(Json(SuccessResponse::with_message((), "Lead form deleted")))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn embed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<EmbedQuery>,
) -> Result<Json<SuccessResponse<EmbedCode>>, ErrorResponse> {
    let kind = embed_kind(query.kind.as_deref())?;
    let form = owned_form(&state, user.id, id).await?;

    let base = state.config.server.public_base_url.trim_end_matches('/');
    Ok(Json(SuccessResponse::new(EmbedCode {
        kind,
        code: embed_code(base, &form.slug, kind),
        url: format!("{}/forms/{}", base, form.slug),
    })))
}

#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
pub async fn submissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
    Query(query): Query<SubmissionQuery>,
) -> Result<Json<SuccessResponse<SubmissionPage>>, ErrorResponse> {
    let form = owned_form(&state, user.id, id).await?;
    let filter = SubmissionFilter {
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(0),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let page = state.submissions().list(form.id, &filter).await?;
    Ok(Json(SuccessResponse::new(page)))
}

/// Public endpoint behind the embedded form
#[tracing::instrument(skip(state, headers, data, utm), fields(slug = %slug))]
pub async fn submit(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(utm): Query<UtmQuery>,
    headers: HeaderMap,
    Json(data): Json<Map<String, Value>>,
) -> Result<Json<SubmitResponse>, ErrorResponse> {
    let meta = submission_meta(&headers, utm);
    let response = state.lead_capture.submit(&slug, &data, meta).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_embed_kind_defaults_to_iframe() {
        assert_eq!(embed_kind(None).unwrap(), EmbedKind::Iframe);
        assert_eq!(embed_kind(Some("script")).unwrap(), EmbedKind::Script);
        assert!(embed_kind(Some("popup")).is_err());
    }

    #[test]
    fn test_submission_meta_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        headers.insert("referer", HeaderValue::from_static(" "));

        let meta = submission_meta(
            &headers,
            UtmQuery {
                utm_source: Some("instagram".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(meta.referrer, None);
        assert_eq!(meta.utm_source.as_deref(), Some("instagram"));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.4"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    /// *For any* forwarded chain, the first hop is the client.
    #[test]
    fn property_client_ip_is_first_forwarded_hop() {
        use proptest::prelude::*;

        proptest!(|(hops in prop::collection::vec("[0-9]{1,3}(\\.[0-9]{1,3}){3}", 1..5))| {
            let mut headers = HeaderMap::new();
            headers.insert(
                "x-forwarded-for",
                HeaderValue::from_str(&hops.join(", ")).unwrap(),
            );
            prop_assert_eq!(client_ip(&headers), Some(hops[0].clone()));
        });
    }
}
