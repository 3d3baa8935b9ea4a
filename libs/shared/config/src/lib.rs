use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Storage (PostgREST) and bearer token verification
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub supabase_jwt_secret: String,

    // Durable task queue
    pub redis_url: Option<String>,

    pub backend_url: String,
    pub frontend_url: String,
    pub server_port: u16,

    // Payment gateway
    pub payunit_base_url: String,
    pub payunit_api_key: String,
    pub payunit_username: String,
    pub payunit_password: String,
    pub payunit_mode: String,
    pub payunit_trusted_ip_prefix: String,
    pub payunit_status_timeout_seconds: u64,

    // Video provider
    pub zoom_account_id: String,
    pub zoom_client_id: String,
    pub zoom_client_secret: String,
    pub zoom_api_base_url: String,
    pub zoom_oauth_url: String,
    pub zoom_webhook_secret_token: String,
    pub zoom_webhook_tolerance_seconds: i64,
    pub zoom_sdk_client_id: String,
    pub zoom_sdk_client_secret: String,

    pub platform_fee: i64,
    pub worker_concurrency: usize,
}

fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", name);
        String::new()
    })
}

fn with_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{} not set, using default", name);
        default.to_string()
    })
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid value, using default", name);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_anon_key = required("SUPABASE_ANON_PUBLIC_KEY");

        let config = Self {
            supabase_url: required("SUPABASE_URL"),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, falling back to anon key");
                    supabase_anon_key.clone()
                }),
            supabase_anon_key,
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET"),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            backend_url: with_default("BACKEND_URL", "http://localhost:3000"),
            frontend_url: with_default("FRONTEND_URL", "http://localhost:5173"),
            server_port: parsed("SERVER_PORT", 3000),
            payunit_base_url: with_default("PAYUNIT_BASE_URL", "https://gateway.payunit.net"),
            payunit_api_key: required("PAYUNIT_API_KEY"),
            payunit_username: required("PAYUNIT_API_USERNAME"),
            payunit_password: required("PAYUNIT_API_PASSWORD"),
            payunit_mode: with_default("PAYUNIT_MODE", "sandbox"),
            payunit_trusted_ip_prefix: with_default("PAYUNIT_TRUSTED_IP_PREFIX", "138.197."),
            payunit_status_timeout_seconds: parsed("PAYUNIT_STATUS_TIMEOUT_SECONDS", 10),
            zoom_account_id: required("ZOOM_ACCOUNT_ID"),
            zoom_client_id: required("ZOOM_CLIENT_ID"),
            zoom_client_secret: required("ZOOM_CLIENT_SECRET"),
            zoom_api_base_url: with_default("ZOOM_API_BASE_URL", "https://api.zoom.us/v2"),
            zoom_oauth_url: with_default("ZOOM_OAUTH_URL", "https://zoom.us/oauth/token"),
            zoom_webhook_secret_token: required("ZOOM_WEBHOOK_SECRET_TOKEN"),
            zoom_webhook_tolerance_seconds: parsed("ZOOM_WEBHOOK_TOLERANCE_SECONDS", 300),
            zoom_sdk_client_id: required("ZOOM_SDK_CLIENT_ID"),
            zoom_sdk_client_secret: required("ZOOM_SDK_CLIENT_SECRET"),
            platform_fee: parsed("PLATFORM_FEE", 1000),
            worker_concurrency: parsed("WORKER_CONCURRENCY", 10),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.payunit_base_url.is_empty()
            && !self.payunit_api_key.is_empty()
            && !self.payunit_username.is_empty()
            && !self.payunit_password.is_empty()
    }

    pub fn is_video_conferencing_configured(&self) -> bool {
        !self.zoom_account_id.is_empty()
            && !self.zoom_client_id.is_empty()
            && !self.zoom_client_secret.is_empty()
            && !self.zoom_api_base_url.is_empty()
    }

    pub fn is_meeting_sdk_configured(&self) -> bool {
        !self.zoom_sdk_client_id.is_empty() && !self.zoom_sdk_client_secret.is_empty()
    }

    pub fn is_queue_configured(&self) -> bool {
        self.redis_url.is_some()
    }

    pub fn is_live_payment_mode(&self) -> bool {
        self.payunit_mode.eq_ignore_ascii_case("live")
    }
}
