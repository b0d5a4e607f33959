use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

// 用户资料与拉黑关系属于外部协作方，这个模块是匹配引擎消费它们的门面

pub const STATUS_VERIFIED: &str = "verified";

const USER_COLUMNS: &str = "user_id, name, date_of_birth, photo_url, city, gender, \
     interested_in, verification_status, is_active, hide_distance, \
     latitude, longitude, last_location_updated_at, \
     published_lat, published_lng, published_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub city: Option<String>,
    pub gender: String,
    pub interested_in: String, // JSON数组
    pub verification_status: String,
    pub is_active: bool,
    pub hide_distance: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_location_updated_at: Option<DateTime<Utc>>,
    pub published_lat: Option<f64>,
    pub published_lng: Option<f64>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub photo_url: Option<String>,
    pub city: Option<String>,
    pub gender: String,
    pub interested_in: Vec<String>,
    pub verification_status: String,
    pub is_active: bool,
    pub hide_distance: bool,
}

impl User {
    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, new_user: NewUser) -> Result<Self, sqlx::Error> {
        let interested_in =
            serde_json::to_string(&new_user.interested_in).unwrap_or_else(|_| "[]".into());

        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, name, date_of_birth, photo_url, city, gender,
                interested_in, verification_status, is_active, hide_distance
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_user.user_id)
        .bind(&new_user.name)
        .bind(new_user.date_of_birth)
        .bind(&new_user.photo_url)
        .bind(&new_user.city)
        .bind(&new_user.gender)
        .bind(interested_in)
        .bind(&new_user.verification_status)
        .bind(new_user.is_active)
        .bind(new_user.hide_distance)
        .execute(pool)
        .await?;

        let user = Self::find_by_id(pool, &new_user.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Ok(user)
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == STATUS_VERIFIED
    }

    pub fn interest_set(&self) -> Vec<String> {
        serde_json::from_str(&self.interested_in).unwrap_or_default()
    }

    // 按生日推算年龄，未到生日的年份减一
    pub fn age(&self) -> Option<i32> {
        let dob = self.date_of_birth?;
        let today = Utc::now().date_naive();
        let mut age = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        Some(age)
    }

    pub fn initial(&self) -> String {
        self.name
            .chars()
            .next()
            .map(|c| c.to_uppercase().to_string())
            .unwrap_or_default()
    }
}

// 双向拉黑：返回与该用户存在任一方向拉黑关系的所有对方id
pub async fn blocked_user_ids(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT blocker_id, blocked_id FROM user_blocks WHERE blocker_id = ? OR blocked_id = ?",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut blocked = HashSet::new();
    for (blocker_id, blocked_id) in rows {
        if blocker_id == user_id {
            blocked.insert(blocked_id);
        } else {
            blocked.insert(blocker_id);
        }
    }

    Ok(blocked)
}

pub async fn block(
    pool: &SqlitePool,
    blocker_id: &str,
    blocked_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?) \
         ON CONFLICT (blocker_id, blocked_id) DO NOTHING",
    )
    .bind(blocker_id)
    .bind(blocked_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn verified_user(user_id: &str) -> NewUser {
        NewUser {
            user_id: user_id.into(),
            name: format!("User {}", user_id),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 6, 15),
            photo_url: Some(format!("https://cdn.example.com/{}.jpg", user_id)),
            city: Some("Santa Cruz".into()),
            gender: "female".into(),
            interested_in: vec!["male".into(), "female".into()],
            verification_status: STATUS_VERIFIED.into(),
            is_active: true,
            hide_distance: false,
        }
    }

    #[tokio::test]
    async fn create_and_find_roundtrip() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let created = User::create(&pool, verified_user("alice")).await.unwrap();

        let found = User::find_by_id(&pool, "alice").await.unwrap().unwrap();
        assert_eq!(found.user_id, created.user_id);
        assert_eq!(found.city.as_deref(), Some("Santa Cruz"));
        assert!(found.is_verified());
        assert!(found.is_active);
        assert!(found.latitude.is_none());
        assert_eq!(found.interest_set(), vec!["male", "female"]);
    }

    #[tokio::test]
    async fn find_missing_user_returns_none() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        assert!(User::find_by_id(&pool, "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn age_is_derived_from_date_of_birth() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let user = User::create(&pool, verified_user("alice")).await.unwrap();

        let age = user.age().unwrap();
        let years_since = Utc::now().date_naive().year() - 2000;
        assert!(age == years_since || age == years_since - 1);

        let mut no_dob = user.clone();
        no_dob.date_of_birth = None;
        assert!(no_dob.age().is_none());
    }

    #[tokio::test]
    async fn block_is_bidirectional_in_lookup() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        User::create(&pool, verified_user("alice")).await.unwrap();
        User::create(&pool, verified_user("bob")).await.unwrap();
        User::create(&pool, verified_user("carol")).await.unwrap();

        block(&pool, "alice", "bob").await.unwrap();
        block(&pool, "carol", "alice").await.unwrap();
        // 重复拉黑不报错
        block(&pool, "alice", "bob").await.unwrap();

        let blocked = blocked_user_ids(&pool, "alice").await.unwrap();
        assert!(blocked.contains("bob"));
        assert!(blocked.contains("carol"));
        assert_eq!(blocked.len(), 2);

        let bob_blocked = blocked_user_ids(&pool, "bob").await.unwrap();
        assert!(bob_blocked.contains("alice"));
    }

    #[test]
    fn initial_takes_first_letter_uppercased() {
        let mut user = User {
            user_id: "u1".into(),
            name: "émile".into(),
            date_of_birth: None,
            photo_url: None,
            city: None,
            gender: "male".into(),
            interested_in: "[]".into(),
            verification_status: "unverified".into(),
            is_active: true,
            hide_distance: false,
            latitude: None,
            longitude: None,
            last_location_updated_at: None,
            published_lat: None,
            published_lng: None,
            published_at: None,
        };
        assert_eq!(user.initial(), "É");

        user.name = String::new();
        assert_eq!(user.initial(), "");
    }
}
