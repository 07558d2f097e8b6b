pub mod http;
pub mod rules;

pub use http::HttpBackend;
pub use rules::{RuleBasedBackend, RULES_BACKEND_NAME};
