use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::matcher::{self, CoordSource};
use crate::notify;
use crate::routes::crossing::model::{CrossedPair, EncounterHistory};
use crate::users::User;

// 写入节流：原始坐标30分钟一次，公开投影6小时一次
pub const RAW_UPDATE_COOLDOWN_MINS: i64 = 30;
pub const PUBLISH_COOLDOWN_HOURS: i64 = 6;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLocationResponse {
    pub success: bool,
    pub nearby_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishLocationResponse {
    pub success: bool,
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_publish_at: Option<DateTime<Utc>>,
}

impl RecordLocationResponse {
    fn user_not_found() -> Self {
        Self {
            success: false,
            nearby_count: 0,
            skipped: None,
            reason: Some("user_not_found".into()),
        }
    }

    fn skipped() -> Self {
        Self {
            success: true,
            nearby_count: 0,
            skipped: Some(true),
            reason: Some("cooldown".into()),
        }
    }

    fn recorded(nearby_count: i64) -> Self {
        Self {
            success: true,
            nearby_count,
            skipped: None,
            reason: None,
        }
    }
}

// 位置写入：节流、落库，已验证用户触发附近匹配，
// 每个命中的候选进相遇计数和相遇历史
pub async fn record_location(
    pool: &SqlitePool,
    config: &Config,
    http: &reqwest::Client,
    user_id: &str,
    latitude: f64,
    longitude: f64,
) -> Result<RecordLocationResponse, sqlx::Error> {
    let Some(user) = User::find_by_id(pool, user_id).await? else {
        return Ok(RecordLocationResponse::user_not_found());
    };

    let now = Utc::now();

    // 30分钟内的重复上报是常态，不算错误
    if let Some(last) = user.last_location_updated_at {
        if now - last < Duration::minutes(RAW_UPDATE_COOLDOWN_MINS) {
            return Ok(RecordLocationResponse::skipped());
        }
    }

    sqlx::query(
        "UPDATE users SET latitude = ?, longitude = ?, last_location_updated_at = ? \
         WHERE user_id = ?",
    )
    .bind(latitude)
    .bind(longitude)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;

    // 未验证用户只记录位置，不参与匹配
    if !user.is_verified() {
        return Ok(RecordLocationResponse::recorded(0));
    }

    let candidates =
        matcher::find_nearby_candidates(pool, &user, latitude, longitude, CoordSource::Raw)
            .await?;

    let mut unlocks = Vec::new();
    for candidate in &candidates {
        if let Some(unlock) =
            CrossedPair::record_encounter(pool, &user.user_id, &candidate.user.user_id).await?
        {
            unlocks.push(unlock);
        }
        EncounterHistory::record(pool, &user.user_id, &candidate.user).await?;
    }

    for unlock in unlocks {
        notify::send_unlock_notification(http, config, &unlock.user_a, &unlock.user_b, &unlock.pair_id);
    }

    Ok(RecordLocationResponse::recorded(candidates.len() as i64))
}

// 公开投影6小时才允许覆盖一次，这是其他用户唯一能看到的坐标
pub async fn publish_location(
    pool: &SqlitePool,
    user_id: &str,
    latitude: f64,
    longitude: f64,
) -> Result<PublishLocationResponse, sqlx::Error> {
    let Some(user) = User::find_by_id(pool, user_id).await? else {
        return Ok(PublishLocationResponse {
            success: false,
            published: false,
            reason: Some("user_not_found".into()),
            published_at: None,
            next_publish_at: None,
        });
    };

    let now = Utc::now();

    if let Some(published_at) = user.published_at {
        let next_publish_at = published_at + Duration::hours(PUBLISH_COOLDOWN_HOURS);
        if now < next_publish_at {
            return Ok(PublishLocationResponse {
                success: true,
                published: false,
                reason: Some("cooldown".into()),
                published_at: Some(published_at),
                next_publish_at: Some(next_publish_at),
            });
        }
    }

    sqlx::query(
        "UPDATE users SET published_lat = ?, published_lng = ?, published_at = ? \
         WHERE user_id = ?",
    )
    .bind(latitude)
    .bind(longitude)
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(PublishLocationResponse {
        success: true,
        published: true,
        reason: None,
        published_at: Some(now),
        next_publish_at: Some(now + Duration::hours(PUBLISH_COOLDOWN_HOURS)),
    })
}
