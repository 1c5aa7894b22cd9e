// config.rs
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct SlaSettings {
    pub enabled: bool,
    pub default_response_hours: i64,
    pub default_resolve_hours: i64,
    /// Tenant-wide business window, UTC hours.
    pub business_hours_start: u32,
    pub business_hours_end: u32,
    /// 0 = Sunday .. 6 = Saturday
    pub work_days: Vec<u32>,
    pub breach_scan_secs: u64,
}

impl Default for SlaSettings {
    fn default() -> Self {
        SlaSettings {
            enabled: true,
            default_response_hours: 24,
            default_resolve_hours: 72,
            business_hours_start: 9,
            business_hours_end: 17,
            work_days: vec![1, 2, 3, 4, 5],
            breach_scan_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TicketSettings {
    pub auto_assign_enabled: bool,
    pub max_attachments: usize,
}

impl Default for TicketSettings {
    fn default() -> Self {
        TicketSettings {
            auto_assign_enabled: true,
            max_attachments: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub log_level: String,
    pub stats_cache_ttl: usize,
    pub sla: SlaSettings,
    pub tickets: TicketSettings,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_work_days(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|day| day.trim().parse::<u32>().ok())
        .filter(|day| *day <= 6)
        .collect()
}

impl Config {
    pub fn init() -> Config {
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");

        let sla_defaults = SlaSettings::default();
        let work_days = env_opt("SLA_WORK_DAYS")
            .map(|raw| parse_work_days(&raw))
            .filter(|days| !days.is_empty())
            .unwrap_or(sla_defaults.work_days);

        let sla = SlaSettings {
            enabled: env_or("SLA_ENABLED", sla_defaults.enabled),
            default_response_hours: env_or("SLA_DEFAULT_RESPONSE_HOURS", sla_defaults.default_response_hours),
            default_resolve_hours: env_or("SLA_DEFAULT_RESOLVE_HOURS", sla_defaults.default_resolve_hours),
            business_hours_start: env_or("SLA_BUSINESS_HOURS_START", sla_defaults.business_hours_start),
            business_hours_end: env_or("SLA_BUSINESS_HOURS_END", sla_defaults.business_hours_end),
            work_days,
            breach_scan_secs: env_or("SLA_BREACH_SCAN_SECS", sla_defaults.breach_scan_secs),
        };

        let ticket_defaults = TicketSettings::default();
        let tickets = TicketSettings {
            auto_assign_enabled: env_or("TICKET_AUTO_ASSIGN_ENABLED", ticket_defaults.auto_assign_enabled),
            max_attachments: env_or("TICKET_MAX_ATTACHMENTS", ticket_defaults.max_attachments),
        };

        Config {
            database_url: env_opt("DATABASE_URL"),
            redis_url: env_opt("REDIS_URL"),
            jwt_secret,
            port: env_or("PORT", 5011),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            log_level: env_opt("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            stats_cache_ttl: env_or("STATS_CACHE_TTL_SECS", 60),
            sla,
            tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_days_ignore_junk() {
        assert_eq!(parse_work_days("1, 2,x,9,5"), vec![1, 2, 5]);
    }

    #[test]
    fn sla_defaults() {
        let sla = SlaSettings::default();
        assert!(sla.enabled);
        assert_eq!(sla.default_response_hours, 24);
        assert_eq!(sla.default_resolve_hours, 72);
        assert_eq!(sla.work_days, vec![1, 2, 3, 4, 5]);
    }
}
