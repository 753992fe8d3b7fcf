pub mod comment;
pub mod community;
pub mod quiz;
pub mod user;

pub(crate) use user::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
