pub mod db;
pub mod gemini;

pub use db::PgSessionStore;
pub use gemini::GeminiBackend;
