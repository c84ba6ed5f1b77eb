use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub databases: usize,
    pub loglevel: String,
    // Persistence
    pub appendonly: bool,
    pub appendfilename: String,
    // Cluster
    pub self_addr: Option<String>,
    pub peers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            databases: 16,
            loglevel: "info".to_string(),
            appendonly: false,
            appendfilename: "appendonly.aof".to_string(),
            self_addr: None,
            peers: Vec::new(),
        }
    }
}

impl Config {
    /// Build a config from command-line flags. `--config <file>` loads a file
    /// in place; flags after it override the file's values.
    pub fn from_args(args: &[String]) -> std::io::Result<Self> {
        let mut config = Config::default();
        let mut i = 0;
        while i < args.len() {
            let Some(key) = args[i].strip_prefix("--") else {
                i += 1;
                continue;
            };
            let Some(value) = args.get(i + 1) else {
                break;
            };
            if key == "config" {
                config.load_file(value)?;
            } else if let Err(e) = config.set(key, value) {
                tracing::warn!("ignoring --{key}: {e}");
            }
            i += 2;
        }
        Ok(config)
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.apply(&content);
        Ok(())
    }

    /// Apply `key value` lines. Blank lines and `#` comments are skipped.
    pub fn apply(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                tracing::warn!("ignoring config line without value: {line}");
                continue;
            };
            if let Err(e) = self.set(key, value.trim()) {
                tracing::warn!("ignoring config line '{line}': {e}");
            }
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_lowercase().as_str() {
            "bind" => self.bind = value.to_string(),
            "port" => {
                self.port = value.parse().map_err(|_| "Invalid port value".to_string())?;
            }
            "databases" => {
                self.databases = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "Invalid databases value".to_string())?;
            }
            "loglevel" => self.loglevel = value.to_string(),
            "appendonly" => {
                self.appendonly = match value.to_lowercase().as_str() {
                    "yes" | "true" => true,
                    "no" | "false" => false,
                    _ => return Err("Invalid appendonly value".to_string()),
                };
            }
            "appendfilename" => self.appendfilename = value.to_string(),
            "self" => {
                self.self_addr = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            "peers" => {
                self.peers = value
                    .split([',', ' '])
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            other => return Err(format!("Unknown parameter '{other}'")),
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Cluster mode needs both an identity and at least one peer.
    pub fn is_cluster(&self) -> bool {
        self.self_addr.is_some() && !self.peers.is_empty()
    }
}
