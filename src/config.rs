use std::collections::HashMap;
use std::fs;

/// INI-style configuration: global keys plus `[section]` scoped keys.
#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }

        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self {
            globals: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }

    /// Numeric getter with section -> global -> default fallback.
    #[must_use]
    pub fn get_usize(&self, section: &str, key: &str, default: usize) -> usize {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_u16(&self, section: &str, key: &str, default: u16) -> u16 {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parse_sections_and_globals() {
        let cfg = Config::parse(
            "# comment\n\
             log_dir = logs\n\
             [dispatcher]\n\
             max_capacity = 400\n\
             [session]\n\
             remote_ip = \"192.0.2.1\"\n",
        );

        assert_eq!(cfg.get_global("log_dir"), Some("logs"));
        assert_eq!(cfg.get_usize("dispatcher", "max_capacity", 500), 400);
        assert_eq!(cfg.get("session", "remote_ip"), Some("192.0.2.1"));
    }

    #[test]
    fn fallbacks_apply_in_order() {
        let cfg = Config::parse("volume = 0.5\n[playback]\n");
        assert_eq!(cfg.get_or_default("playback", "volume", "1.0"), "0.5");
        assert_eq!(cfg.get_or_default("playback", "missing", "x"), "x");
        assert_eq!(cfg.get_u16("session", "remote_port", 7236), 7236);
    }
}
