use std::path::PathBuf;

/// Client settings from `CAMPFIRE_SERVER_URL` and `CAMPFIRE_CACHE_PATH`,
/// after loading `.env` if present.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub cache_path: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server_url: lookup("CAMPFIRE_SERVER_URL")
                .unwrap_or_else(|| "http://localhost:3000".into()),
            cache_path: lookup("CAMPFIRE_CACHE_PATH")
                .unwrap_or_else(|| "campfire-cache.db".into())
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_local_defaults() {
        let cfg = ClientConfig::from_lookup(|_| None);
        assert_eq!(cfg.server_url, "http://localhost:3000");
        assert_eq!(cfg.cache_path, PathBuf::from("campfire-cache.db"));

        let cfg = ClientConfig::from_lookup(|key| {
            (key == "CAMPFIRE_SERVER_URL").then(|| "https://camp.example".to_string())
        });
        assert_eq!(cfg.server_url, "https://camp.example");
    }
}
