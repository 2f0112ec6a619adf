//! oidc authentication provider.
//!
//! only the hand-off contract matters to the core: `/oidc/register/:mkey`
//! parks the machine key in the registration cache under a state token,
//! the idp redirects back to `/oidc/callback`, and the callback consumes
//! the token and binds the machine to the namespace derived from the
//! authenticated email.

use openidconnect::{
    AuthenticationFlow, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, IssuerUrl, Nonce, RedirectUrl, Scope, TokenResponse,
    core::{CoreClient, CoreIdTokenVerifier, CoreProviderMetadata, CoreResponseType},
};
use wirescale_types::{Namespace, OidcConfig};

/// claims extracted from a verified id token.
#[derive(Debug, Clone)]
pub struct OidcClaims {
    /// authenticated email address.
    pub email: String,
    /// whether the provider vouches for the email.
    pub email_verified: bool,
    /// preferred username, if the provider supplies one.
    pub preferred_username: Option<String>,
}

/// oidc provider client.
///
/// discovery happens once at startup; the oauth2 client is rebuilt per
/// request from the cached metadata.
#[derive(Clone)]
pub struct OidcProvider {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: openidconnect::reqwest::Client,
    config: OidcConfig,
}

impl OidcProvider {
    /// create a provider from config, performing discovery.
    pub async fn new(config: OidcConfig, server_url: &str) -> Result<Self, String> {
        // redirects disabled to keep the token endpoint exchange pinned
        // to the discovered url
        let http_client = openidconnect::reqwest::ClientBuilder::new()
            .redirect(openidconnect::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;

        let issuer_url =
            IssuerUrl::new(config.issuer.clone()).map_err(|e| format!("invalid issuer: {}", e))?;

        let redirect_url = RedirectUrl::new(format!(
            "{}/oidc/callback",
            server_url.trim_end_matches('/')
        ))
        .map_err(|e| format!("invalid redirect URL: {}", e))?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| format!("OIDC discovery failed: {}", e))?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id.clone()),
            client_secret: ClientSecret::new(config.client_secret.clone()),
            redirect_url,
            http_client,
            config,
        })
    }

    fn client(
        &self,
    ) -> CoreClient<
        EndpointSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointMaybeSet,
        EndpointMaybeSet,
    > {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }

    /// build the authorization url for a registration, using the given
    /// cache token as the oauth2 state. returns (url, nonce).
    pub fn authorization_url(&self, state: String) -> (String, String) {
        let client = self.client();
        let mut auth_req = client.authorize_url(
            AuthenticationFlow::<CoreResponseType>::AuthorizationCode,
            move || CsrfToken::new(state),
            Nonce::new_random,
        );

        for scope in &self.config.scope {
            auth_req = auth_req.add_scope(Scope::new(scope.clone()));
        }
        for (key, value) in &self.config.extra_params {
            auth_req = auth_req.add_extra_param(key, value);
        }

        let (url, _csrf, nonce) = auth_req.url();
        (url.to_string(), nonce.secret().to_string())
    }

    /// exchange the authorization code and verify the id token.
    pub async fn exchange_and_verify(
        &self,
        code: String,
        nonce: &str,
    ) -> Result<OidcClaims, String> {
        let token_response = self
            .client()
            .exchange_code(AuthorizationCode::new(code))
            .map_err(|e| format!("token endpoint not configured: {:?}", e))?
            .request_async(&self.http_client)
            .await
            .map_err(|e| format!("token exchange failed: {}", e))?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| "no id token in response".to_string())?;

        let verifier = CoreIdTokenVerifier::new_confidential_client(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.provider_metadata.issuer().clone(),
            self.provider_metadata.jwks().clone(),
        );

        let claims = id_token
            .claims(&verifier, &Nonce::new(nonce.to_string()))
            .map_err(|e| format!("id token verification failed: {}", e))?;

        Ok(OidcClaims {
            email: claims
                .email()
                .map(|e| e.as_str().to_string())
                .unwrap_or_default(),
            email_verified: claims.email_verified().unwrap_or(false),
            preferred_username: claims
                .preferred_username()
                .map(|u| u.as_str().to_string()),
        })
    }

    /// the provider configuration.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }
}

/// validate claims against the configured principal filters.
///
/// returns `Err` with a reason when the authenticated principal is not
/// allowed to register.
pub fn validate_claims(config: &OidcConfig, claims: &OidcClaims) -> Result<(), String> {
    if !config.allowed_domains.is_empty() {
        let domain = claims
            .email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("");
        if !config.allowed_domains.iter().any(|d| d == domain) {
            return Err("unauthorized principal (domain mismatch)".to_string());
        }
    }

    if !config.allowed_users.is_empty() && !config.allowed_users.iter().any(|u| u == &claims.email)
    {
        return Err("unauthorized principal (user mismatch)".to_string());
    }

    Ok(())
}

/// derive a namespace name from an authenticated email.
///
/// `u@ex.com` becomes `u.ex.com`, or just `u` when the configured domain
/// strip is on. the result is sanitised to namespace name rules.
pub fn namespace_from_email(email: &str, strip_domain: bool) -> Result<String, String> {
    let email = email.to_lowercase();
    let source = if strip_domain {
        email.split('@').next().unwrap_or(&email).to_string()
    } else {
        email.replace('@', ".")
    };

    let name: String = source
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let name = name.trim_matches(['-', '.']).to_string();

    Namespace::new(wirescale_types::NamespaceId(0), name.clone())
        .map_err(|e| format!("could not derive namespace from email: {}", e))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OidcConfig {
        OidcConfig {
            issuer: "https://sso.example.com".to_string(),
            client_id: "wirescale".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        }
    }

    fn test_claims() -> OidcClaims {
        OidcClaims {
            email: "alice@example.com".to_string(),
            email_verified: true,
            preferred_username: Some("alice".to_string()),
        }
    }

    #[test]
    fn test_validate_no_filters_allows_all() {
        assert!(validate_claims(&test_config(), &test_claims()).is_ok());
    }

    #[test]
    fn test_validate_allowed_domain() {
        let mut config = test_config();
        config.allowed_domains = vec!["example.com".to_string()];
        assert!(validate_claims(&config, &test_claims()).is_ok());

        config.allowed_domains = vec!["other.com".to_string()];
        assert!(validate_claims(&config, &test_claims()).is_err());
    }

    #[test]
    fn test_validate_allowed_users() {
        let mut config = test_config();
        config.allowed_users = vec!["alice@example.com".to_string()];
        assert!(validate_claims(&config, &test_claims()).is_ok());

        config.allowed_users = vec!["bob@example.com".to_string()];
        assert!(validate_claims(&config, &test_claims()).is_err());
    }

    #[test]
    fn test_namespace_from_email() {
        assert_eq!(
            namespace_from_email("u@ex.com", false).unwrap(),
            "u.ex.com"
        );
        assert_eq!(namespace_from_email("u@ex.com", true).unwrap(), "u");
    }

    #[test]
    fn test_namespace_from_email_sanitises() {
        assert_eq!(
            namespace_from_email("First.Last+tag@Example.COM", false).unwrap(),
            "first.last-tag.example.com"
        );
    }

    #[test]
    fn test_namespace_from_unusable_email() {
        assert!(namespace_from_email("@@@", false).is_err());
    }
}
