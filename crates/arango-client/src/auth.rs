use crate::{config::DatabaseConfig, Error};
use reqwest::header::HeaderValue;

/// Resolved request authorization: a prebuilt `Authorization` header value,
/// or nothing for servers running without authentication.
#[derive(Clone, Debug)]
pub struct Auth(Option<HeaderValue>);

#[derive(serde::Serialize)]
struct OpenAuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(serde::Deserialize)]
struct OpenAuthResponse {
    jwt: String,
}

impl Auth {
    /// Resolve credentials once per run. A caller-supplied JWT is preferred;
    /// otherwise username/password are exchanged for a session JWT via
    /// `POST /_open/auth` against the first endpoint that answers.
    pub async fn resolve(
        config: &DatabaseConfig,
        http: &reqwest::Client,
        endpoints: &[url::Url],
    ) -> crate::Result<Self> {
        if let Some(token) = &config.jwt_token {
            return Self::bearer(token);
        }

        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Ok(Self(None));
        };

        let mut last_err = None;
        for endpoint in endpoints {
            match obtain_jwt(http, endpoint, username, password).await {
                Ok(jwt) => return Self::bearer(&jwt),
                Err(err @ Error::Auth) => return Err(err),
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint, error = %err, "JWT exchange failed; trying sibling endpoint");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(Error::Auth))
    }

    pub fn bearer(token: &str) -> crate::Result<Self> {
        let value = format!("bearer {token}").parse().map_err(|_| Error::Auth)?;
        Ok(Self(Some(value)))
    }

    /// Attach the resolved authorization, if any, to an outgoing request.
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.0 {
            Some(header) => builder.header(reqwest::header::AUTHORIZATION, header.clone()),
            None => builder,
        }
    }
}

async fn obtain_jwt(
    http: &reqwest::Client,
    endpoint: &url::Url,
    username: &str,
    password: &str,
) -> crate::Result<String> {
    let url = endpoint
        .join("/_open/auth")
        .map_err(|_| Error::InvalidEndpoint(endpoint.to_string()))?;

    let response = http
        .post(url)
        .json(&OpenAuthRequest { username, password })
        .send()
        .await
        .map_err(|cause| Error::Transport {
            endpoint: endpoint.to_string(),
            cause,
        })?;

    match response.status() {
        status if status.is_success() => {
            let OpenAuthResponse { jwt } =
                response.json().await.map_err(|err| Error::Decode {
                    context: format!("/_open/auth response: {err}"),
                })?;
            tracing::debug!(endpoint = %endpoint, "obtained session JWT");
            Ok(jwt)
        }
        status if status == reqwest::StatusCode::UNAUTHORIZED => Err(Error::Auth),
        status => Err(Error::HttpStatus {
            code: status.as_u16(),
            body_excerpt: excerpt(&response.text().await.unwrap_or_default()),
        }),
    }
}

/// Truncate a response body for inclusion in an error message.
pub(crate) fn excerpt(body: &str) -> String {
    const LIMIT: usize = 256;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_shape() {
        let auth = Auth::bearer("abc.def.ghi").unwrap();
        let header = auth.0.as_ref().unwrap();
        assert_eq!(header.to_str().unwrap(), "bearer abc.def.ghi");
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = "x".repeat(1000);
        let e = excerpt(&body);
        assert!(e.len() < body.len());
        assert!(e.ends_with("..."));
        assert_eq!(excerpt("short"), "short");
    }
}
