use chrono::{DateTime, Datelike, Duration, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// Quizzes younger than this carry the "new" badge
pub const NEW_QUIZ_WINDOW_DAYS: i64 = 7;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

/// `"3 days ago - 2024/5/1"`; months are 30 days and years 365
pub fn format_relative(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - created_at;
    let hours = elapsed.num_hours();
    let ago = if hours < 1 {
        match elapsed.num_minutes() {
            m if m <= 1 => "less than a minute ago".to_string(),
            m => plural(m, "minute"),
        }
    } else if hours < 24 {
        plural(hours, "hour")
    } else if hours < 24 * 30 {
        plural(hours / 24, "day")
    } else if hours < 24 * 365 {
        plural(hours / 24 / 30, "month")
    } else {
        plural(hours / 24 / 365, "year")
    };
    format!(
        "{} - {}/{}/{}",
        ago,
        created_at.year(),
        created_at.month(),
        created_at.day()
    )
}

pub fn is_new(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < Duration::days(NEW_QUIZ_WINDOW_DAYS)
}
