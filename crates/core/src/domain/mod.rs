pub mod intent;
pub mod message;
pub mod prefs;
pub mod request;
