pub mod cache;
pub mod crawler;
pub mod database;
pub mod discord;
pub mod recaptcha;
pub mod redis;
