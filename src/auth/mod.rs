pub mod authority;
pub mod claims;
pub mod jwt;
pub mod lineage;
pub mod password;

pub use authority::{TokenAuthority, TokenPair};
pub use claims::{Claims, TokenKind};
pub use jwt::TokenCodec;
pub use lineage::{
    hash_token, InMemoryLineageStore, LineageRecord, LineageStore, PgLineageStore, Rotation,
};
pub use password::{validate_password, CredentialVerifier};
