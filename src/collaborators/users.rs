use crate::collaborators::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::models::User;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

/// HTTP client for the identity/user service
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let response = self
            .client
            .get(format!("{}/users/{}", self.base_url, id))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("User service: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "User service returned {}",
                response.status()
            )));
        }

        let user = response
            .json::<User>()
            .await
            .map_err(|e| AppError::ExternalService(format!("User service: {}", e)))?;
        Ok(Some(user))
    }

    async fn increment_user_stat(&self, id: Uuid, field: &str, delta: i64) -> AppResult<()> {
        let body = serde_json::json!({ "field": field, "delta": delta });
        self.client
            .post(format!("{}/users/{}/stats", self.base_url, id))
            .json(&body)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("User service: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::ExternalService(format!("User service: {}", e)))?;
        Ok(())
    }
}
