//! 序列化与时间相关的辅助函数

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 当前时间（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 本地时区今天零点对应的毫秒时间戳
pub fn start_of_local_day_millis() -> i64 {
    let today = Local::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.timestamp_millis())
        // 零点恰好落在夏令时空档时退化为 UTC 零点
        .unwrap_or_else(|| today.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

/// 生成帖子 ID
pub fn generate_post_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
