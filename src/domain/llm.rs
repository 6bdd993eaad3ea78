//! LLM provider registry and caller routing.
//!
//! Providers are OpenAI-compatible endpoints. Each caller (a feature that
//! talks to a model) can be mapped to a provider; unmapped callers use the
//! default provider, then the first enabled one.

use crate::domain::error::StockpickError;
use crate::ports::chat_port::ChatPort;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caller {
    DeepAnalysis,
    StockAnalyzer,
    ExplainGenerator,
    DailyReport,
    General,
}

impl Caller {
    pub const ALL: [Caller; 5] = [
        Caller::DeepAnalysis,
        Caller::StockAnalyzer,
        Caller::ExplainGenerator,
        Caller::DailyReport,
        Caller::General,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Caller::DeepAnalysis => "deep_analysis",
            Caller::StockAnalyzer => "stock_analyzer",
            Caller::ExplainGenerator => "explain_generator",
            Caller::DailyReport => "daily_report",
            Caller::General => "general",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Caller::DeepAnalysis => "Deep analysis",
            Caller::StockAnalyzer => "Stock analysis engine",
            Caller::ExplainGenerator => "Strategy explanations",
            Caller::DailyReport => "Daily report",
            Caller::General => "General",
        }
    }

    pub fn parse(s: &str) -> Option<Caller> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        Caller::ALL.into_iter().find(|c| c.id() == s)
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: String,
}

fn enabled_default() -> bool {
    true
}

impl Provider {
    /// URL and key are both set.
    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// Key with everything but the last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{tail}", "*".repeat(chars.len() - 4))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewProvider {
    pub id: Option<String>,
    pub name: String,
    pub base_url: String,
    pub model_id: String,
    pub api_key: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub model_id: Option<String>,
    pub api_key: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderRegistry {
    pub providers: Vec<Provider>,
    pub caller_mapping: BTreeMap<String, String>,
    pub default_provider_id: String,
}

impl ProviderRegistry {
    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Add a provider. The first provider added becomes the default.
    pub fn add(&mut self, new: NewProvider) -> Result<&Provider, StockpickError> {
        let id = match new.id.map(|s| s.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => format!("provider-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
        };
        if self.get(&id).is_some() {
            return Err(StockpickError::ConfigInvalid {
                section: "llm".into(),
                key: "id".into(),
                reason: format!("provider {id} already exists"),
            });
        }
        let name = if new.name.trim().is_empty() {
            "custom".to_string()
        } else {
            new.name
        };
        self.providers.push(Provider {
            id: id.clone(),
            name,
            base_url: new.base_url.trim().trim_end_matches('/').to_string(),
            model_id: new.model_id,
            api_key: new.api_key,
            enabled: new.enabled,
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        if self.default_provider_id.is_empty() {
            self.default_provider_id = id;
        }
        let index = self.providers.len() - 1;
        Ok(&self.providers[index])
    }

    pub fn update(&mut self, id: &str, update: ProviderUpdate) -> Option<&Provider> {
        let provider = self.providers.iter_mut().find(|p| p.id == id)?;
        if let Some(name) = update.name {
            provider.name = name;
        }
        if let Some(url) = update.base_url {
            provider.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(model) = update.model_id {
            provider.model_id = model;
        }
        if let Some(key) = update.api_key {
            provider.api_key = key;
        }
        if let Some(enabled) = update.enabled {
            provider.enabled = enabled;
        }
        Some(provider)
    }

    /// Remove a provider, re-pointing the default at the first remaining
    /// one and dropping caller mappings that referenced it.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.providers.len();
        self.providers.retain(|p| p.id != id);
        if self.default_provider_id == id {
            self.default_provider_id = self
                .providers
                .first()
                .map(|p| p.id.clone())
                .unwrap_or_default();
        }
        self.caller_mapping.retain(|_, pid| pid != id);
        self.providers.len() < before
    }

    pub fn set_default(&mut self, id: &str) -> Result<(), StockpickError> {
        if self.get(id).is_none() {
            return Err(StockpickError::UnknownProvider(id.to_string()));
        }
        self.default_provider_id = id.to_string();
        Ok(())
    }

    pub fn set_caller(&mut self, caller: Caller, id: &str) -> Result<(), StockpickError> {
        if self.get(id).is_none() {
            return Err(StockpickError::UnknownProvider(id.to_string()));
        }
        self.caller_mapping
            .insert(caller.id().to_string(), id.to_string());
        Ok(())
    }

    pub fn remove_caller(&mut self, caller: Caller) -> bool {
        self.caller_mapping.remove(caller.id()).is_some()
    }

    /// Every caller with its mapped provider id, if any.
    pub fn callers(&self) -> Vec<(Caller, Option<&str>)> {
        Caller::ALL
            .into_iter()
            .map(|c| (c, self.caller_mapping.get(c.id()).map(String::as_str)))
            .collect()
    }

    /// Caller mapping, then default, then first enabled provider.
    /// Disabled providers are never returned.
    pub fn resolve(&self, caller: Caller) -> Option<&Provider> {
        let preferred = self
            .caller_mapping
            .get(caller.id())
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.default_provider_id);
        if let Some(p) = self.get(preferred).filter(|p| p.enabled) {
            return Some(p);
        }
        self.providers.iter().find(|p| p.enabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            max_tokens: 4000,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }
}

/// Routes chat requests for a caller to its resolved provider.
pub struct LlmClient<'a> {
    registry: &'a ProviderRegistry,
    transport: &'a dyn ChatPort,
}

impl<'a> LlmClient<'a> {
    pub fn new(registry: &'a ProviderRegistry, transport: &'a dyn ChatPort) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Reply text, or an empty string when no usable provider is
    /// configured or the request fails.
    pub fn chat(&self, caller: Caller, request: &ChatRequest) -> String {
        let Some(provider) = self.registry.resolve(caller) else {
            warn!(%caller, "no enabled model provider");
            return String::new();
        };
        if !provider.is_complete() {
            warn!(%caller, provider = %provider.name, "provider has no base URL or API key");
            return String::new();
        }
        info!(%caller, provider = %provider.name, model = %provider.model_id, "calling model");
        match self.transport.complete(provider, request) {
            Ok(reply) => {
                info!(%caller, chars = reply.chars().count(), "model call succeeded");
                reply
            }
            Err(e) => {
                warn!(%caller, error = %e, "model call failed");
                String::new()
            }
        }
    }

    /// Send a short request to one provider and return its reply.
    pub fn test_provider(&self, id: &str) -> Result<String, StockpickError> {
        let provider = self
            .registry
            .get(id)
            .ok_or_else(|| StockpickError::UnknownProvider(id.to_string()))?;
        if !provider.is_complete() {
            return Err(StockpickError::Llm {
                reason: format!("provider {id} needs both a base URL and an API key"),
            });
        }
        let request = ChatRequest {
            max_tokens: 20,
            ..ChatRequest::new("Reply with \"connected\".")
        };
        let reply = self.transport.complete(provider, &request)?;
        Ok(reply.chars().take(50).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn new_provider(id: &str) -> NewProvider {
        NewProvider {
            id: Some(id.to_string()),
            name: id.to_uppercase(),
            base_url: format!("https://{id}.example.com/v1/"),
            model_id: "model-x".into(),
            api_key: "sk-123456".into(),
            enabled: true,
        }
    }

    fn registry() -> ProviderRegistry {
        let mut reg = ProviderRegistry::default();
        reg.add(new_provider("alpha")).unwrap();
        reg.add(new_provider("beta")).unwrap();
        reg
    }

    #[test]
    fn first_provider_becomes_default() {
        let reg = registry();
        assert_eq!(reg.default_provider_id, "alpha");
        assert_eq!(reg.get("alpha").unwrap().base_url, "https://alpha.example.com/v1");
    }

    #[test]
    fn duplicate_ids_rejected_and_ids_generated() {
        let mut reg = registry();
        assert!(reg.add(new_provider("alpha")).is_err());
        let generated = reg
            .add(NewProvider {
                id: None,
                ..new_provider("x")
            })
            .unwrap();
        assert!(generated.id.starts_with("provider-"));
    }

    #[test]
    fn remove_repoints_default_and_drops_mappings() {
        let mut reg = registry();
        reg.set_caller(Caller::DeepAnalysis, "alpha").unwrap();
        assert!(reg.remove("alpha"));
        assert!(!reg.remove("alpha"));
        assert_eq!(reg.default_provider_id, "beta");
        assert!(reg.caller_mapping.is_empty());

        assert!(reg.remove("beta"));
        assert_eq!(reg.default_provider_id, "");
    }

    #[test]
    fn resolution_order() {
        let mut reg = registry();
        assert_eq!(reg.resolve(Caller::General).unwrap().id, "alpha");

        reg.set_caller(Caller::DeepAnalysis, "beta").unwrap();
        assert_eq!(reg.resolve(Caller::DeepAnalysis).unwrap().id, "beta");

        reg.update(
            "beta",
            ProviderUpdate {
                enabled: Some(false),
                ..ProviderUpdate::default()
            },
        );
        assert_eq!(reg.resolve(Caller::DeepAnalysis).unwrap().id, "alpha");

        reg.update(
            "alpha",
            ProviderUpdate {
                enabled: Some(false),
                ..ProviderUpdate::default()
            },
        );
        assert!(reg.resolve(Caller::General).is_none());
    }

    #[test]
    fn mapping_requires_known_provider() {
        let mut reg = registry();
        assert!(matches!(
            reg.set_caller(Caller::General, "nope"),
            Err(StockpickError::UnknownProvider(_))
        ));
        assert!(reg.set_default("nope").is_err());
        assert!(!reg.remove_caller(Caller::General));
        assert_eq!(reg.callers().len(), 5);
    }

    #[test]
    fn caller_parse_and_mask() {
        assert_eq!(Caller::parse("deep-analysis"), Some(Caller::DeepAnalysis));
        assert_eq!(Caller::parse("other"), None);
        let reg = registry();
        assert_eq!(reg.get("alpha").unwrap().masked_key(), "*****3456");
    }

    struct Echo {
        seen: RefCell<Vec<String>>,
        fail: bool,
    }

    impl ChatPort for Echo {
        fn complete(&self, provider: &Provider, request: &ChatRequest) -> Result<String, StockpickError> {
            self.seen.borrow_mut().push(provider.id.clone());
            if self.fail {
                return Err(StockpickError::Llm {
                    reason: "boom".into(),
                });
            }
            Ok(format!("echo: {}", request.prompt))
        }
    }

    #[test]
    fn client_routes_and_degrades_to_empty() {
        let mut reg = registry();
        let echo = Echo {
            seen: RefCell::new(Vec::new()),
            fail: false,
        };
        let client = LlmClient::new(&reg, &echo);
        assert_eq!(client.chat(Caller::General, &ChatRequest::new("hi")), "echo: hi");
        assert_eq!(*echo.seen.borrow(), vec!["alpha"]);

        reg.update(
            "alpha",
            ProviderUpdate {
                api_key: Some(String::new()),
                ..ProviderUpdate::default()
            },
        );
        let client = LlmClient::new(&reg, &echo);
        assert_eq!(client.chat(Caller::General, &ChatRequest::new("hi")), "");
        assert!(client.test_provider("alpha").is_err());

        let failing = Echo {
            seen: RefCell::new(Vec::new()),
            fail: true,
        };
        let reg = registry();
        let client = LlmClient::new(&reg, &failing);
        assert_eq!(client.chat(Caller::General, &ChatRequest::new("hi")), "");
        assert!(matches!(
            client.test_provider("missing"),
            Err(StockpickError::UnknownProvider(_))
        ));
    }

    #[test]
    fn registry_json_shape() {
        let json = r#"{"providers":[{"id":"m","name":"M","base_url":"u","model_id":"x"}]}"#;
        let reg: ProviderRegistry = serde_json::from_str(json).unwrap();
        assert!(reg.providers[0].enabled);
        assert_eq!(reg.default_provider_id, "");
        assert!(reg.caller_mapping.is_empty());
    }
}
