use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: Option<String>,
    pub position: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    /// Email address of the subject.
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
