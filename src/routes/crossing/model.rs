use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::users::User;
use crate::utils::canonical_pair;

// 相遇计数与解锁
pub const PAIR_COOLDOWN_HOURS: i64 = 24;
pub const UNLOCK_THRESHOLD: i64 = 10;
pub const UNLOCK_WINDOW_HOURS: i64 = 48;

// 相遇历史
pub const HISTORY_DEDUPE_HOURS: i64 = 24;
pub const HISTORY_TTL_DAYS: i64 = 14;
pub const HISTORY_CAP_PER_USER: usize = 15;

// 清理任务单次处理上限
const CLEANUP_BATCH: i64 = 100;

const PAIR_COLUMNS: &str = "pair_id, user_a, user_b, count, last_crossed_at, unlock_expires_at";
const HISTORY_COLUMNS: &str = "entry_id, user_a, user_b, area_name, created_at, expires_at";

#[derive(Debug, Clone, FromRow)]
pub struct CrossedPair {
    pub pair_id: String,
    pub user_a: String,
    pub user_b: String,
    pub count: i64,
    pub last_crossed_at: DateTime<Utc>,
    pub unlock_expires_at: Option<DateTime<Utc>>,
}

// 本次相遇触发了解锁，由调用方负责通知双方
#[derive(Debug, Clone)]
pub struct UnlockEvent {
    pub pair_id: String,
    pub user_a: String,
    pub user_b: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossedPathItem {
    pub id: String,
    pub count: i64,
    pub last_crossed_at: DateTime<Utc>,
    pub is_unlocked: bool,
    pub unlock_expires_at: Option<DateTime<Utc>>,
    pub unlock_time_remaining: i64,
    pub progress_to_unlock: f64,
    pub user: CrossedUserSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossedUserSummary {
    pub id: String,
    pub name: String,
    pub age: Option<i32>,
    pub photo_url: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockStatus {
    pub is_unlocked: bool,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_expires_at: Option<DateTime<Utc>>,
    pub unlock_time_remaining: i64,
}

impl CrossedPair {
    pub async fn find_by_users(
        pool: &SqlitePool,
        a: &str,
        b: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (user_a, user_b) = canonical_pair(a, b);
        let sql = format!(
            "SELECT {} FROM crossed_pairs WHERE user_a = ? AND user_b = ?",
            PAIR_COLUMNS
        );
        sqlx::query_as::<_, CrossedPair>(&sql)
            .bind(user_a)
            .bind(user_b)
            .fetch_optional(pool)
            .await
    }

    // 记录一次有效相遇。冷却期内直接跳过；本次计数首次达到阈值时
    // 武装48小时解锁窗口并返回解锁事件，由调用方去通知。
    pub async fn record_encounter(
        pool: &SqlitePool,
        a: &str,
        b: &str,
    ) -> Result<Option<UnlockEvent>, sqlx::Error> {
        let (user_a, user_b) = canonical_pair(a, b);
        let now = Utc::now();
        let cooldown_cutoff = now - Duration::hours(PAIR_COOLDOWN_HOURS);

        match Self::find_by_users(pool, user_a, user_b).await? {
            None => {
                // 并发的首次相遇靠唯一约束兜底，冲突时视为对方已计数
                sqlx::query(
                    "INSERT INTO crossed_pairs (pair_id, user_a, user_b, count, last_crossed_at) \
                     VALUES (?, ?, ?, 1, ?) \
                     ON CONFLICT (user_a, user_b) DO NOTHING",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(user_a)
                .bind(user_b)
                .bind(now)
                .execute(pool)
                .await?;
            }
            Some(pair) => {
                if now - pair.last_crossed_at < Duration::hours(PAIR_COOLDOWN_HOURS) {
                    // 同一对24小时内只计一次
                    return Ok(None);
                }

                // 自增和冷却判断放进同一条UPDATE，并发时不会重复计数
                let updated = sqlx::query(
                    "UPDATE crossed_pairs SET count = count + 1, last_crossed_at = ? \
                     WHERE pair_id = ? AND last_crossed_at <= ?",
                )
                .bind(now)
                .bind(&pair.pair_id)
                .bind(cooldown_cutoff)
                .execute(pool)
                .await?
                .rows_affected();

                if updated == 0 {
                    return Ok(None);
                }
            }
        }

        let Some(pair) = Self::find_by_users(pool, user_a, user_b).await? else {
            return Ok(None);
        };

        // 解锁是一次性的：只在从未设置过时武装，之后的相遇不再续期
        if pair.count >= UNLOCK_THRESHOLD && pair.unlock_expires_at.is_none() {
            let armed = sqlx::query(
                "UPDATE crossed_pairs SET unlock_expires_at = ? \
                 WHERE pair_id = ? AND unlock_expires_at IS NULL",
            )
            .bind(now + Duration::hours(UNLOCK_WINDOW_HOURS))
            .bind(&pair.pair_id)
            .execute(pool)
            .await?
            .rows_affected();

            if armed == 1 {
                return Ok(Some(UnlockEvent {
                    pair_id: pair.pair_id,
                    user_a: pair.user_a,
                    user_b: pair.user_b,
                }));
            }
        }

        Ok(None)
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<CrossedPathItem>, sqlx::Error> {
        let limit = limit.unwrap_or(20).min(50); // 最多返回50条记录

        let sql = format!(
            "SELECT {} FROM crossed_pairs WHERE user_a = ? OR user_b = ? \
             ORDER BY last_crossed_at DESC LIMIT ?",
            PAIR_COLUMNS
        );
        let pairs: Vec<CrossedPair> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        let now = Utc::now();
        let mut items = Vec::new();
        for pair in pairs {
            let other_id = if pair.user_a == user_id {
                &pair.user_b
            } else {
                &pair.user_a
            };
            // 对方资料缺失的记录直接跳过
            let Some(other) = User::find_by_id(pool, other_id).await? else {
                continue;
            };
            items.push(pair.into_item(now, &other));
        }

        Ok(items)
    }

    pub async fn unlock_status(
        pool: &SqlitePool,
        a: &str,
        b: &str,
    ) -> Result<UnlockStatus, sqlx::Error> {
        let now = Utc::now();
        let status = match Self::find_by_users(pool, a, b).await? {
            Some(pair) => UnlockStatus {
                is_unlocked: pair.is_unlocked(now),
                count: pair.count,
                unlock_expires_at: pair.unlock_expires_at,
                unlock_time_remaining: pair.unlock_time_remaining(now),
            },
            None => UnlockStatus {
                is_unlocked: false,
                count: 0,
                unlock_expires_at: None,
                unlock_time_remaining: 0,
            },
        };
        Ok(status)
    }

    pub async fn count_for_user(pool: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM crossed_pairs WHERE user_a = ? OR user_b = ?")
            .bind(user_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    fn is_unlocked(&self, now: DateTime<Utc>) -> bool {
        self.unlock_expires_at.is_some_and(|t| t > now)
    }

    // 剩余解锁时间（秒），已过期或未解锁为0
    fn unlock_time_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.unlock_expires_at
            .map(|t| (t - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    fn into_item(self, now: DateTime<Utc>, other: &User) -> CrossedPathItem {
        let is_unlocked = self.is_unlocked(now);
        let unlock_time_remaining = self.unlock_time_remaining(now);
        CrossedPathItem {
            id: self.pair_id,
            count: self.count,
            last_crossed_at: self.last_crossed_at,
            is_unlocked,
            unlock_expires_at: self.unlock_expires_at,
            unlock_time_remaining,
            progress_to_unlock: (self.count as f64 / UNLOCK_THRESHOLD as f64).min(1.0),
            user: CrossedUserSummary {
                id: other.user_id.clone(),
                name: other.name.clone(),
                age: other.age(),
                photo_url: other.photo_url.clone(),
                is_verified: other.is_verified(),
            },
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EncounterHistoryEntry {
    pub entry_id: String,
    pub user_a: String,
    pub user_b: String,
    pub area_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossPathHistoryItem {
    pub id: String,
    pub other_user_id: String,
    pub area_name: String,
    pub created_at: DateTime<Utc>,
    pub photo_url: Option<String>,
    pub initial: String,
}

pub struct EncounterHistory;

impl EncounterHistory {
    // 记录一次相遇历史。历史有自己的24小时去重窗口，和计数冷却互不影响；
    // 区域名只用候选所在城市，绝不落精确坐标。
    pub async fn record(
        pool: &SqlitePool,
        subject_id: &str,
        candidate: &User,
    ) -> Result<(), sqlx::Error> {
        let (user_a, user_b) = canonical_pair(subject_id, &candidate.user_id);
        let now = Utc::now();

        let latest: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT created_at FROM encounter_history WHERE user_a = ? AND user_b = ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(pool)
        .await?;

        if let Some((created_at,)) = latest {
            if now - created_at < Duration::hours(HISTORY_DEDUPE_HOURS) {
                return Ok(());
            }
        }

        let area_name = candidate
            .city
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| format!("Near {}", c))
            .unwrap_or_else(|| "Somewhere nearby".to_string());

        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO encounter_history (entry_id, user_a, user_b, area_name, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_a)
        .bind(user_b)
        .bind(area_name)
        .bind(now)
        .bind(now + Duration::days(HISTORY_TTL_DAYS))
        .execute(&mut *tx)
        .await?;

        // 写入后对两侧用户各自裁剪，上限是按用户算的，不是按配对
        Self::trim_for_user(&mut tx, user_a).await?;
        Self::trim_for_user(&mut tx, user_b).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn trim_for_user(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> Result<(), sqlx::Error> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT entry_id FROM encounter_history WHERE user_a = ? OR user_b = ? \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        for (entry_id,) in ids.into_iter().skip(HISTORY_CAP_PER_USER) {
            sqlx::query("DELETE FROM encounter_history WHERE entry_id = ?")
                .bind(entry_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    // 读取路径先按过期时间过滤，清理任务没跑到也看不到过期记录
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> Result<Vec<CrossPathHistoryItem>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM encounter_history WHERE user_a = ? OR user_b = ? \
             ORDER BY created_at DESC",
            HISTORY_COLUMNS
        );
        let entries: Vec<EncounterHistoryEntry> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(pool)
            .await?;

        let now = Utc::now();
        let mut items = Vec::new();
        for entry in entries
            .into_iter()
            .filter(|e| e.expires_at > now)
            .take(HISTORY_CAP_PER_USER)
        {
            let other_id = if entry.user_a == user_id {
                &entry.user_b
            } else {
                &entry.user_a
            };
            let Some(other) = User::find_by_id(pool, other_id).await? else {
                continue;
            };
            items.push(CrossPathHistoryItem {
                id: entry.entry_id,
                other_user_id: other.user_id.clone(),
                area_name: entry.area_name,
                created_at: entry.created_at,
                photo_url: other.photo_url.clone(),
                initial: other.initial(),
            });
        }

        Ok(items)
    }

    pub async fn cleanup_expired(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query(
            "DELETE FROM encounter_history WHERE entry_id IN ( \
                 SELECT entry_id FROM encounter_history WHERE expires_at <= ? LIMIT ?)",
        )
        .bind(Utc::now())
        .bind(CLEANUP_BATCH)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(deleted)
    }
}
