pub mod api_key;
pub mod rate_limit;

pub use api_key::api_key_middleware;
pub use epiphany_infra::{request_id_middleware, security_headers_middleware};
pub use rate_limit::rate_limit_middleware;
