use chrono::{Duration, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::matcher::{self, CoordSource};
use crate::users::User;

// 缓存相关常量
const NEARBY_CACHE_PREFIX: &str = "nearby:"; // 附近用户缓存前缀
const NEARBY_CACHE_EXPIRE: u64 = 120; // 缓存过期时间，单位秒

// 公开投影的新鲜度分档：3天内solid，6天内faded，再旧的不返回
const FRESHNESS_SOLID_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Solid,
    Faded,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyUserMarker {
    pub id: String,
    pub name: String,
    pub age: Option<i32>,
    pub published_lat: f64,
    pub published_lng: f64,
    pub freshness: Freshness,
    pub photo_url: Option<String>,
    pub is_verified: bool,
    pub hide_distance: bool,
    // 坐标模糊化由客户端按 hide_distance 处理，这里只返回公开投影
}

// 地图标记读取：参考点优先请求者自己的公开投影，未发布过退回原始坐标；
// 候选只来自其他人的公开投影。Ok(None) 表示请求者不存在。
pub async fn get_nearby_users(
    pool: &SqlitePool,
    redis: &Arc<RedisClient>,
    user_id: &str,
) -> Result<Option<Vec<NearbyUserMarker>>, sqlx::Error> {
    let Some(user) = User::find_by_id(pool, user_id).await? else {
        return Ok(None);
    };

    // 地图读取路径要求请求者本人也已验证
    if !user.is_verified() {
        return Ok(Some(Vec::new()));
    }

    let (latitude, longitude) = match (user.published_lat, user.published_lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => match (user.latitude, user.longitude) {
            (Some(lat), Some(lng)) => (lat, lng),
            // 没有任何坐标就没有参考点
            _ => return Ok(Some(Vec::new())),
        },
    };

    // 尝试从缓存读取
    let cache_key = format!("{}{}", NEARBY_CACHE_PREFIX, user_id);
    if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
        let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
        if let Ok(json_str) = cached {
            if let Ok(markers) = serde_json::from_str::<Vec<NearbyUserMarker>>(&json_str) {
                tracing::debug!("Get nearby markers from cache: {}", cache_key);
                return Ok(Some(markers));
            }
        }
    }

    let candidates =
        matcher::find_nearby_candidates(pool, &user, latitude, longitude, CoordSource::Published)
            .await?;

    let now = Utc::now();
    let markers: Vec<NearbyUserMarker> = candidates
        .into_iter()
        .map(|candidate| {
            let freshness = if now - candidate.located_at <= Duration::days(FRESHNESS_SOLID_DAYS)
            {
                Freshness::Solid
            } else {
                // 超过6天的已被匹配器的时效过滤排除
                Freshness::Faded
            };
            NearbyUserMarker {
                id: candidate.user.user_id.clone(),
                name: candidate.user.name.clone(),
                age: candidate.user.age(),
                published_lat: candidate.latitude,
                published_lng: candidate.longitude,
                freshness,
                photo_url: candidate.user.photo_url.clone(),
                is_verified: candidate.user.is_verified(),
                hide_distance: candidate.user.hide_distance,
            }
        })
        .collect();

    // 缓存结果，位置读取变化较快，过期时间短
    if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
        if let Ok(json_str) = serde_json::to_string(&markers) {
            let _: Result<(), redis::RedisError> =
                conn.set_ex(&cache_key, json_str, NEARBY_CACHE_EXPIRE).await;
            tracing::debug!("Set nearby markers to cache: {}", cache_key);
        }
    }

    Ok(Some(markers))
}
