use std::sync::Arc;

use caret_capture::EnvConfig;
use generation_provider::{
    CredentialProvider, EnvCredentialProvider, GenerationClient, StaticCredential,
};
use generation_provider_mock::{MockGenerationClient, MOCK_PROVIDER_ID};
use generation_provider_openai::{OpenAiGenerationClient, OpenAiProviderConfig, OPENAI_PROVIDER_ID};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;
pub const PROVIDER_ENV_VAR: &str = "CARET_CAPTURE_PROVIDER";

/// Generation backend plus the credential source it expects.
pub struct Provider {
    pub client: Arc<dyn GenerationClient>,
    pub credentials: Arc<dyn CredentialProvider>,
}

pub fn provider_from_env(config: &EnvConfig) -> Result<Provider, String> {
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID), config)
}

pub fn provider_for_id(provider_id: &str, config: &EnvConfig) -> Result<Provider, String> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Provider {
            client: Arc::new(MockGenerationClient::echo()),
            credentials: Arc::new(StaticCredential::new(MOCK_PROVIDER_ID)),
        }),
        OPENAI_PROVIDER_ID => {
            let mut provider_config = OpenAiProviderConfig::default();
            if let Some(model) = &config.model {
                provider_config = provider_config.with_model(model.clone());
            }
            if let Some(base_url) = &config.base_url {
                provider_config = provider_config.with_base_url(base_url.clone());
            }

            let client = OpenAiGenerationClient::new(provider_config)
                .map_err(|error| error.message().to_string())?;
            Ok(Provider {
                client: Arc::new(client),
                credentials: Arc::new(EnvCredentialProvider::default()),
            })
        }
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {OPENAI_PROVIDER_ID}"
        )),
    }
}
