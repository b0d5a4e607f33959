use serde_json::json;

use crate::config::Config;

// 解锁通知属于外部通知协作方，这里只做即发即忘的投递：
// 配置了 webhook 就异步推送，失败只记日志，绝不阻塞写入路径
pub fn send_unlock_notification(
    http: &reqwest::Client,
    config: &Config,
    user_a: &str,
    user_b: &str,
    pair_id: &str,
) {
    tracing::info!(
        "Crossed paths unlock reached for pair {} ({} / {})",
        pair_id,
        user_a,
        user_b
    );

    let Some(url) = config.unlock_webhook_url.clone() else {
        return;
    };

    let payload = json!({
        "type": "crossed_paths_unlock",
        "pairId": pair_id,
        "userIds": [user_a, user_b],
    });

    let http = http.clone();
    tokio::spawn(async move {
        if let Err(e) = http.post(&url).json(&payload).send().await {
            tracing::warn!("Failed to deliver unlock notification: {}", e);
        }
    });
}
