use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::matcher::{self, CoordSource};
use crate::users::User;

// 同一用户6小时最多提醒一次；同一(主体,候选)有序对24小时内不重复提醒
pub const SUBJECT_COOLDOWN_HOURS: i64 = 6;
pub const PAIR_DEDUPE_HOURS: i64 = 24;
pub const ALERT_TTL_DAYS: i64 = 7;

// 清理任务单次处理上限
const CLEANUP_BATCH: i64 = 100;

// 响应结构上就放不下任何身份字段，匿名是类型保证的
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DetectResponse {
    fn triggered() -> Self {
        Self {
            triggered: true,
            reason: None,
        }
    }

    fn not_triggered(reason: &str) -> Self {
        Self {
            triggered: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertEvent {
    pub event_id: String,
    pub subject_user_id: String,
    pub candidate_user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AlertEvent {
    pub async fn cleanup_expired(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query(
            "DELETE FROM alert_events WHERE event_id IN ( \
                 SELECT event_id FROM alert_events WHERE expires_at <= ? LIMIT ?)",
        )
        .bind(Utc::now())
        .bind(CLEANUP_BATCH)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}

// 匿名相遇提醒：只扫描公开投影，记录事件但绝不返回对方是谁
pub async fn detect_crossed_users(
    pool: &SqlitePool,
    user_id: &str,
    latitude: f64,
    longitude: f64,
) -> Result<DetectResponse, sqlx::Error> {
    let Some(subject) = User::find_by_id(pool, user_id).await? else {
        return Ok(DetectResponse::not_triggered("user_not_found"));
    };

    let now = Utc::now();

    // 主体冷却：6小时内提醒过就不再扫描
    let latest: Option<(DateTime<Utc>,)> = sqlx::query_as(
        "SELECT created_at FROM alert_events WHERE subject_user_id = ? \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some((created_at,)) = latest {
        if now - created_at < Duration::hours(SUBJECT_COOLDOWN_HOURS) {
            return Ok(DetectResponse::not_triggered("cooldown"));
        }
    }

    // 候选扫描只允许公开投影，原始坐标永不参与
    let candidates =
        matcher::find_nearby_candidates(pool, &subject, latitude, longitude, CoordSource::Published)
            .await?;

    if candidates.is_empty() {
        return Ok(DetectResponse::not_triggered("none"));
    }

    // 24小时内已提醒过的候选剔除
    let dedupe_cutoff = now - Duration::hours(PAIR_DEDUPE_HOURS);
    let recent: Vec<(String,)> = sqlx::query_as(
        "SELECT candidate_user_id FROM alert_events \
         WHERE subject_user_id = ? AND created_at > ?",
    )
    .bind(user_id)
    .bind(dedupe_cutoff)
    .fetch_all(pool)
    .await?;
    let recent: HashSet<String> = recent.into_iter().map(|(id,)| id).collect();

    let mut eligible: Vec<&matcher::MatchCandidate> = candidates
        .iter()
        .filter(|c| !recent.contains(&c.user.user_id))
        .collect();

    if eligible.is_empty() {
        return Ok(DetectResponse::not_triggered("none"));
    }

    // 确定性选择：取id最小的一个候选，不承诺最近优先
    eligible.sort_by(|a, b| a.user.user_id.cmp(&b.user.user_id));
    let chosen = eligible[0];

    sqlx::query(
        "INSERT INTO alert_events (event_id, subject_user_id, candidate_user_id, created_at, expires_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&chosen.user.user_id)
    .bind(now)
    .bind(now + Duration::days(ALERT_TTL_DAYS))
    .execute(pool)
    .await?;

    tracing::debug!("Anonymized proximity alert recorded for {}", user_id);

    Ok(DetectResponse::triggered())
}
