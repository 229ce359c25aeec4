use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    GeminiImagen,
    ZaiCogView,
}

impl Provider {
    pub fn all() -> [Provider; 3] {
        [Provider::OpenAi, Provider::GeminiImagen, Provider::ZaiCogView]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI DALL-E 3",
            Provider::GeminiImagen => "Google Gemini Imagen",
            Provider::ZaiCogView => "Z.AI CogView-4",
        }
    }

    pub fn model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "dall-e-3",
            Provider::GeminiImagen => "imagen-3.0-generate-001",
            Provider::ZaiCogView => "cogview-4-250304",
        }
    }

    /// Environment variable the CLI falls back to when no key is passed.
    pub fn key_env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::GeminiImagen => "GEMINI_API_KEY",
            Provider::ZaiCogView => "ZAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::GeminiImagen => "gemini",
            Provider::ZaiCogView => "zai",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "dalle" | "dall-e" | "dall-e-3" => Ok(Provider::OpenAi),
            "gemini" | "imagen" | "gemini-imagen" => Ok(Provider::GeminiImagen),
            "zai" | "z.ai" | "cogview" | "zhipu" => Ok(Provider::ZaiCogView),
            other => Err(format!(
                "unknown provider '{}', expected one of: openai, gemini, zai",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Standard,
    Hd,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Standard => "standard",
            Quality::Hd => "hd",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Quality::Standard),
            "hd" => Ok(Quality::Hd),
            other => Err(format!("unknown quality '{}', expected standard or hd", other)),
        }
    }
}

/// A user-supplied provider key. Never printed in clear.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn masked(&self) -> String {
        mask_secret(&self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        ApiKey::new(key)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        ApiKey::new(key)
    }
}

pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", start, end)
}

/// Masks bearer tokens and `key=` query parameters embedded in free text.
pub fn scrub_secrets(text: &str) -> String {
    const MARKERS: [&str; 2] = ["Bearer ", "key="];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let next = MARKERS
            .iter()
            .filter_map(|marker| rest.find(marker).map(|idx| (idx, marker.len())))
            .min_by_key(|(idx, _)| *idx);
        let Some((idx, marker_len)) = next else {
            out.push_str(rest);
            break;
        };

        let start = idx + marker_len;
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '&' | '"' | '\'' | ')' | ','))
            .unwrap_or(tail.len());
        if end > 0 {
            out.push_str(&mask_secret(&tail[..end]));
        }
        rest = &tail[end..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_secrets() {
        assert_eq!(
            scrub_secrets("POST https://g.example/v1beta/models?key=AIzaSyD0123456789&alt=json"),
            "POST https://g.example/v1beta/models?key=AIza****6789&alt=json"
        );
        assert_eq!(
            scrub_secrets("Authorization: Bearer sk-abcdefghijklmnop"),
            "Authorization: Bearer sk-a****mnop"
        );
        assert_eq!(scrub_secrets("nothing to hide"), "nothing to hide");
        assert_eq!(scrub_secrets("key="), "key=");
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("imagen".parse::<Provider>().unwrap(), Provider::GeminiImagen);
        assert_eq!("zhipu".parse::<Provider>().unwrap(), Provider::ZaiCogView);
        assert!("midjourney".parse::<Provider>().is_err());
        assert_eq!(Provider::ZaiCogView.to_string(), "zai");
    }

    #[test]
    fn test_quality_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Quality::Hd).unwrap(), "\"hd\"");
        assert_eq!("HD".parse::<Quality>().unwrap(), Quality::Hd);
        assert_eq!(Quality::default().as_str(), "standard");
    }

    #[test]
    fn test_api_key_never_prints_secret() {
        let key = ApiKey::new("  sk-test-0123456789abcdef  ");
        assert_eq!(key.expose(), "sk-test-0123456789abcdef");
        assert_eq!(format!("{:?}", key), "ApiKey(sk-t****cdef)");
        assert_eq!(key.to_string(), "sk-t****cdef");
        assert_eq!(ApiKey::new("short").masked(), "****");
        assert!(ApiKey::new("   ").is_empty());
    }
}
