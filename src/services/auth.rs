// src/services/auth.rs

use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    middleware::tenancy::TenantContext,
    models::auth::{Claims, Role},
};

// Colaborador de identidade: a senha e o login ficam fora do núcleo.
// Aqui só confiamos no trio (usuário, papel, loja) de um token já assinado.
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn verify_token(&self, token: &str) -> Result<TenantContext, AppError> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )?;

        let claims = token_data.claims;
        // ADMIN nunca é vinculado a uma loja, mesmo que o token traga uma
        let tenant_id = match claims.role {
            Role::Admin => None,
            Role::Seller => claims.tenant_id.filter(|t| !t.trim().is_empty()),
        };

        Ok(TenantContext::new(claims.sub, claims.role, tenant_id))
    }
}
