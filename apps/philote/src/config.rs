/// Philote configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret used to verify access tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Maximum number of concurrently registered connections.
    pub max_connections: usize,
    /// Number of messages a connection's inbox holds before publishers wait.
    pub inbox_capacity: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// When set, fan-out goes through Redis pub/sub instead of staying in process.
    pub redis_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing
    /// or a numeric variable does not parse.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT", 6380),
            max_connections: parsed_var("MAX_CONNECTIONS", 255),
            inbox_capacity: parsed_var("INBOX_CAPACITY", 256).max(1),
            read_buffer_size: parsed_var("READ_BUFFER_SIZE", 1024),
            write_buffer_size: parsed_var("WRITE_BUFFER_SIZE", 1024),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} env var must be a number, got {v:?}")),
        _ => default,
    }
}
