mod jwt_middleware;

pub use jwt_middleware::{access_token_from, AuthenticatedUser, JwtMiddleware};
