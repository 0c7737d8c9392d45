use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::Instrument;

use crate::credential::Credential;
use crate::error::AppError;
use crate::lease_pool::{LeasePool, ServiceStats};
use crate::logging::{self, LogLevel};
use crate::util::id;

/// 租赁接口共享状态。
pub struct KeysState {
    pub pool: Arc<LeasePool>,
    pub log_level: LogLevel,
}

#[derive(Deserialize, Default)]
pub struct ServiceQuery {
    #[serde(default)]
    service: Option<String>,
}

impl ServiceQuery {
    fn service(&self) -> Result<&str, AppError> {
        required_service(self.service.as_deref())
    }
}

fn required_service(value: Option<&str>) -> Result<&str, AppError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("缺少 service 参数"))
}

/// 归还请求的字段：表单 body 与 URL query 合并，同名字段只取第一个值（body 在前）。
///
/// 四个凭证字段必填，remaining/reset 可选（缺失或无法解析时使用默认值）。
#[derive(Debug, Default)]
pub struct SetKeyForm {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    access_token: Option<String>,
    access_token_secret: Option<String>,
    remaining: Option<String>,
    reset: Option<String>,
}

impl SetKeyForm {
    fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut form = Self::default();
        for (k, v) in pairs {
            let slot = match k.as_str() {
                "consumer_key" => &mut form.consumer_key,
                "consumer_secret" => &mut form.consumer_secret,
                "access_token" => &mut form.access_token,
                "access_token_secret" => &mut form.access_token_secret,
                "remaining" => &mut form.remaining,
                "reset" => &mut form.reset,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(v.clone());
            }
        }
        form
    }

    fn field(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("")
    }

    fn credential(&self) -> Credential {
        Credential::new(
            Self::field(&self.consumer_key),
            Self::field(&self.consumer_secret),
            Self::field(&self.access_token),
            Self::field(&self.access_token_secret),
        )
    }

    fn remaining(&self) -> Option<i64> {
        self.remaining.as_deref()?.trim().parse().ok()
    }

    fn reset_at(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.reset.as_deref()?.trim().parse().ok()?;
        DateTime::<Utc>::from_timestamp(secs, 0)
    }

    fn raw_params(&self) -> Vec<(&str, &str)> {
        vec![
            ("consumer_key", Self::field(&self.consumer_key)),
            ("consumer_secret", Self::field(&self.consumer_secret)),
            ("access_token", Self::field(&self.access_token)),
            ("access_token_secret", Self::field(&self.access_token_secret)),
            ("remaining", Self::field(&self.remaining)),
            ("reset", Self::field(&self.reset)),
        ]
    }
}

/// GET /get?service=... - 借出凭证
pub async fn handle_get_key(
    State(state): State<Arc<KeysState>>,
    query: Result<Query<ServiceQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let span = tracing::info_span!("get_key", request_id = %id::request_id());
    async move {
        let Query(query) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
        let service = query.service()?;
        if state.log_level.raw_enabled() {
            logging::raw_request("GET", "/get", &[("service", service)]);
        }

        match state.pool.acquire(service) {
            Some(lease) => {
                if state.log_level.lease_enabled() {
                    logging::lease_acquired(
                        service,
                        &lease.credential,
                        lease.remaining,
                        lease.reset_at,
                        lease.available,
                    );
                }
                Ok((StatusCode::OK, Json(lease.credential)).into_response())
            }
            None => {
                if state.log_level.miss_enabled() {
                    logging::lease_miss(service);
                }
                Ok(StatusCode::NO_CONTENT.into_response())
            }
        }
    }
    .instrument(span)
    .await
}

/// POST /set?service=... - 归还凭证
///
/// 凭证字段既可以放在 urlencoded body 里，也可以放在 query 里。
pub async fn handle_set_key(
    State(state): State<Arc<KeysState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    body: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<StatusCode, AppError> {
    let span = tracing::info_span!("set_key", request_id = %id::request_id());
    async move {
        let Query(query) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
        let body = match body {
            Ok(Form(pairs)) => pairs,
            // 非表单 body（或没有 Content-Type）按空 body 处理，字段只从 query 读取。
            Err(FormRejection::InvalidFormContentType(_)) => Vec::new(),
            Err(e) => return Err(AppError::bad_request(e.body_text())),
        };

        let service = required_service(
            query
                .iter()
                .find(|(k, _)| k == "service")
                .map(|(_, v)| v.as_str()),
        )?;
        let form = SetKeyForm::from_pairs(body.iter().chain(query.iter()));

        if state.log_level.raw_enabled() {
            let mut params = vec![("service", service)];
            params.extend(form.raw_params());
            logging::raw_request("POST", "/set", &params);
        }

        let credential = form.credential();
        match state
            .pool
            .release(service, credential.clone(), form.remaining(), form.reset_at())
        {
            Ok(released) => {
                if state.log_level.lease_enabled() {
                    logging::lease_released(
                        service,
                        &credential,
                        released.remaining,
                        released.reset_at,
                        released.available,
                    );
                }
                Ok(StatusCode::OK)
            }
            Err(e) => {
                if state.log_level.miss_enabled() {
                    logging::release_rejected(service, &e.to_string());
                }
                Err(e.into())
            }
        }
    }
    .instrument(span)
    .await
}

/// GET /stats - 各 service 的池状态
pub async fn handle_stats(State(state): State<Arc<KeysState>>) -> Json<Vec<ServiceStats>> {
    Json(state.pool.stats())
}
