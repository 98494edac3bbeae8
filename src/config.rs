use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Account used by the admin bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub admin: AdminConfig,
    pub default_event_id: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_i64_or(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "qr-event-manager"),
            audience: env_or("JWT_AUDIENCE", "qr-event-users"),
            ttl_minutes: env_i64_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_i64_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let admin = AdminConfig {
            email: env_or("ADMIN_EMAIL", "admin@example.com").trim().to_lowercase(),
            name: env_or("ADMIN_NAME", "Admin User"),
            phone: env_or("ADMIN_PHONE", "1234567890"),
            password: env_or("ADMIN_PASSWORD", "admin123"),
        };
        let default_event_id = env_or("DEFAULT_EVENT_ID", "default-event");
        Ok(Self {
            database_url,
            jwt,
            admin,
            default_event_id,
        })
    }
}
