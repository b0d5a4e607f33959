use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::users::{self, User};
use crate::utils::{bounding_ranges, calculate_distance};

// 固定匹配半径（米）与位置时效（天），不提供配置
pub const NEARBY_RADIUS_METERS: f64 = 1000.0;
pub const LOCATION_STALE_DAYS: i64 = 6;

// 候选坐标来源：写入路径用原始坐标，读取路径只允许公开投影
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSource {
    Raw,
    Published,
}

#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub user: User,
    pub latitude: f64,
    pub longitude: f64,
    pub located_at: DateTime<Utc>,
    pub distance: f64,
}

// 共享的附近用户匹配：位置写入、地图读取与匿名提醒都走这里。
// 先用经纬度范围在库里粗筛，再在内存里做精确距离、时效、偏好与拉黑过滤。
pub async fn find_nearby_candidates(
    pool: &SqlitePool,
    subject: &User,
    latitude: f64,
    longitude: f64,
    source: CoordSource,
) -> Result<Vec<MatchCandidate>, sqlx::Error> {
    let (lat_range, lon_range) = bounding_ranges(latitude, NEARBY_RADIUS_METERS);

    let sql = match source {
        CoordSource::Raw => {
            "SELECT user_id, name, date_of_birth, photo_url, city, gender, \
                    interested_in, verification_status, is_active, hide_distance, \
                    latitude, longitude, last_location_updated_at, \
                    published_lat, published_lng, published_at \
             FROM users \
             WHERE user_id != ? \
                 AND is_active = 1 \
                 AND verification_status = 'verified' \
                 AND latitude BETWEEN ? AND ? \
                 AND longitude BETWEEN ? AND ?"
        }
        CoordSource::Published => {
            "SELECT user_id, name, date_of_birth, photo_url, city, gender, \
                    interested_in, verification_status, is_active, hide_distance, \
                    latitude, longitude, last_location_updated_at, \
                    published_lat, published_lng, published_at \
             FROM users \
             WHERE user_id != ? \
                 AND is_active = 1 \
                 AND verification_status = 'verified' \
                 AND published_lat BETWEEN ? AND ? \
                 AND published_lng BETWEEN ? AND ?"
        }
    };

    let rows: Vec<User> = sqlx::query_as(sql)
        .bind(&subject.user_id)
        .bind(latitude - lat_range)
        .bind(latitude + lat_range)
        .bind(longitude - lon_range)
        .bind(longitude + lon_range)
        .fetch_all(pool)
        .await?;

    let blocked = users::blocked_user_ids(pool, &subject.user_id).await?;
    let subject_interests = subject.interest_set();
    let stale_cutoff = Utc::now() - Duration::days(LOCATION_STALE_DAYS);

    let mut candidates = Vec::new();
    for user in rows {
        // 坐标或时间戳缺失的候选直接丢弃，不算错误
        let (cand_lat, cand_lng, located_at) = match source {
            CoordSource::Raw => {
                match (user.latitude, user.longitude, user.last_location_updated_at) {
                    (Some(lat), Some(lng), Some(at)) => (lat, lng, at),
                    _ => continue,
                }
            }
            CoordSource::Published => {
                match (user.published_lat, user.published_lng, user.published_at) {
                    (Some(lat), Some(lng), Some(at)) => (lat, lng, at),
                    _ => continue,
                }
            }
        };

        if located_at < stale_cutoff {
            continue;
        }

        if blocked.contains(&user.user_id) {
            continue;
        }

        // 双方的偏好都要包含对方的类别
        if !subject_interests.iter().any(|g| *g == user.gender) {
            continue;
        }
        if !user.interest_set().iter().any(|g| *g == subject.gender) {
            continue;
        }

        let distance = calculate_distance(latitude, longitude, cand_lat, cand_lng);
        if distance > NEARBY_RADIUS_METERS {
            continue;
        }

        candidates.push(MatchCandidate {
            user,
            latitude: cand_lat,
            longitude: cand_lng,
            located_at,
            distance,
        });
    }

    // 按距离排序，近的在前
    candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::users::{NewUser, STATUS_VERIFIED};

    async fn seed_user(pool: &SqlitePool, user_id: &str, gender: &str, wants: &[&str]) -> User {
        User::create(
            pool,
            NewUser {
                user_id: user_id.into(),
                name: format!("User {}", user_id),
                date_of_birth: chrono::NaiveDate::from_ymd_opt(1998, 3, 1),
                photo_url: None,
                city: Some("Santa Cruz".into()),
                gender: gender.into(),
                interested_in: wants.iter().map(|s| s.to_string()).collect(),
                verification_status: STATUS_VERIFIED.into(),
                is_active: true,
                hide_distance: false,
            },
        )
        .await
        .unwrap()
    }

    async fn set_raw_location(pool: &SqlitePool, user_id: &str, lat: f64, lng: f64) {
        sqlx::query(
            "UPDATE users SET latitude = ?, longitude = ?, last_location_updated_at = ? \
             WHERE user_id = ?",
        )
        .bind(lat)
        .bind(lng)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn set_published_location(pool: &SqlitePool, user_id: &str, lat: f64, lng: f64) {
        sqlx::query(
            "UPDATE users SET published_lat = ?, published_lng = ?, published_at = ? \
             WHERE user_id = ?",
        )
        .bind(lat)
        .bind(lng)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn backdate_raw_location(pool: &SqlitePool, user_id: &str, days: i64) {
        sqlx::query("UPDATE users SET last_location_updated_at = ? WHERE user_id = ?")
            .bind(Utc::now() - Duration::days(days))
            .bind(user_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn matches_within_radius_and_excludes_beyond() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;
        seed_user(&pool, "near", "male", &["female"]).await;
        seed_user(&pool, "far", "male", &["female"]).await;

        // 0.0005度纬度差约55米，0.01度约1.1公里
        set_raw_location(&pool, "near", 37.0005, -122.0).await;
        set_raw_location(&pool, "far", 37.01, -122.0).await;

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.user_id, "near");
        assert!(matches[0].distance < 100.0);
    }

    #[tokio::test]
    async fn radius_boundary_holds_at_one_kilometer() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        // 赤道上沿经线摆放：弧长/半径换算出的纬度差就是精确距离
        let inside_lat = (999.9999_f64 / 6371000.0).to_degrees();
        let outside_lat = (1000.1_f64 / 6371000.0).to_degrees();

        seed_user(&pool, "inside", "male", &["female"]).await;
        set_raw_location(&pool, "inside", inside_lat, 0.0).await;
        seed_user(&pool, "outside", "male", &["female"]).await;
        set_raw_location(&pool, "outside", outside_lat, 0.0).await;

        let matches = find_nearby_candidates(&pool, &subject, 0.0, 0.0, CoordSource::Raw)
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.user_id, "inside");
        assert!(matches[0].distance <= NEARBY_RADIUS_METERS);
    }

    #[tokio::test]
    async fn excludes_self_inactive_and_unverified() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;
        set_raw_location(&pool, "subject", 37.0, -122.0).await;

        seed_user(&pool, "inactive", "male", &["female"]).await;
        set_raw_location(&pool, "inactive", 37.0001, -122.0).await;
        sqlx::query("UPDATE users SET is_active = 0 WHERE user_id = 'inactive'")
            .execute(&pool)
            .await
            .unwrap();

        seed_user(&pool, "unverified", "male", &["female"]).await;
        set_raw_location(&pool, "unverified", 37.0001, -122.0).await;
        sqlx::query("UPDATE users SET verification_status = 'pending' WHERE user_id = 'unverified'")
            .execute(&pool)
            .await
            .unwrap();

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn excludes_stale_locations_after_six_days() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        seed_user(&pool, "fresh", "male", &["female"]).await;
        set_raw_location(&pool, "fresh", 37.0002, -122.0).await;
        backdate_raw_location(&pool, "fresh", 5).await;

        seed_user(&pool, "stale", "male", &["female"]).await;
        set_raw_location(&pool, "stale", 37.0002, -122.0).await;
        backdate_raw_location(&pool, "stale", 7).await;

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.user_id, "fresh");
    }

    #[tokio::test]
    async fn requires_mutual_preference() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        // 对方不在主体的偏好里
        seed_user(&pool, "wrong-category", "female", &["female"]).await;
        set_raw_location(&pool, "wrong-category", 37.0001, -122.0).await;

        // 主体不在对方的偏好里
        seed_user(&pool, "uninterested", "male", &["male"]).await;
        set_raw_location(&pool, "uninterested", 37.0001, -122.0).await;

        // 双向都满足
        seed_user(&pool, "mutual", "male", &["female"]).await;
        set_raw_location(&pool, "mutual", 37.0001, -122.0).await;

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.user_id, "mutual");
    }

    #[tokio::test]
    async fn excludes_blocked_in_either_direction() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        seed_user(&pool, "blocked-by-me", "male", &["female"]).await;
        set_raw_location(&pool, "blocked-by-me", 37.0001, -122.0).await;
        users::block(&pool, "subject", "blocked-by-me").await.unwrap();

        seed_user(&pool, "blocked-me", "male", &["female"]).await;
        set_raw_location(&pool, "blocked-me", 37.0001, -122.0).await;
        users::block(&pool, "blocked-me", "subject").await.unwrap();

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn published_source_ignores_raw_coordinates() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        // 原始坐标在旁边，但从未发布过投影
        seed_user(&pool, "unpublished", "male", &["female"]).await;
        set_raw_location(&pool, "unpublished", 37.0001, -122.0).await;

        // 投影在旁边，原始坐标在远处
        seed_user(&pool, "published", "male", &["female"]).await;
        set_raw_location(&pool, "published", 40.0, -100.0).await;
        set_published_location(&pool, "published", 37.0002, -122.0).await;

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Published)
                .await
                .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user.user_id, "published");
        // 返回的是公开投影坐标
        assert!((matches[0].latitude - 37.0002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sorts_candidates_by_distance() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let subject = seed_user(&pool, "subject", "female", &["male"]).await;

        seed_user(&pool, "farther", "male", &["female"]).await;
        set_raw_location(&pool, "farther", 37.005, -122.0).await;
        seed_user(&pool, "closest", "male", &["female"]).await;
        set_raw_location(&pool, "closest", 37.0001, -122.0).await;

        let matches =
            find_nearby_candidates(&pool, &subject, 37.0, -122.0, CoordSource::Raw)
                .await
                .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].user.user_id, "closest");
        assert_eq!(matches[1].user.user_id, "farther");
    }
}
