pub mod analytics;
pub mod health;
pub mod stream;
pub mod track;
pub mod ws;
